//! Simulated GPU for unit tests.
//!
//! ```text
//!   MockCe ── emits [RELEASE, va_hi, va_lo, payload] into the push
//!   MockPushbuffer::end_push ── parses releases, queues them on MockDevice
//!   MockChannel::write_gp_put ── runs the queue when auto-execute is on
//!   MockDevice::execute ── writes payloads into MockSemaphore memory
//! ```

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};

use spin::Mutex;

use uvm_core::{Error, GlobalStatus, GpuAddr, GpuSemaphore, Result};
use uvm_hal::{
    CeCapFlags, CeHal, ChannelInfo, CopyEngineCaps, Gpu, HostHal, HwChannel, PushRegion, PushStream, Pushbuffer,
    RmInterface, StagedRegion, COPY_ENGINE_COUNT_MAX,
};

use crate::channel::ChannelContext;
use crate::manager::{ChannelManager, ManagerConfig};

/// Method word the mock CE uses for semaphore releases
pub(crate) const TEST_SEMAPHORE_RELEASE: u32 = 0x5e3a_0001;
/// Method word emitted by the mock CE init
pub(crate) const TEST_CE_INIT: u32 = 0xce00_0001;
/// Method word emitted by the mock host init
pub(crate) const TEST_HOST_INIT: u32 = 0x4057_0001;

const SEMAPHORE_BASE: u64 = 0x10_0000_0000;
const PUSHBUFFER_BASE: u64 = 0x20_0000_0000;
const PUSH_STRIDE: u32 = 0x100;
const PUSHBUFFER_SIZE: u32 = 0x10_0000;

// =============================================================================
// DEVICE
// =============================================================================

/// Executes semaphore releases in submission order
#[derive(Default)]
pub(crate) struct MockDevice {
    semaphores: Mutex<Vec<(u64, Arc<AtomicU32>)>>,
    queue: Mutex<VecDeque<(u64, u32)>>,
    auto_execute: AtomicBool,
}

impl MockDevice {
    fn register(&self, va: u64, payload: Arc<AtomicU32>) {
        self.semaphores.lock().push((va, payload));
    }

    fn enqueue(&self, va: u64, payload: u32) {
        self.queue.lock().push_back((va, payload));
    }

    pub(crate) fn queued_releases(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn auto_execute(&self) -> bool {
        self.auto_execute.load(Ordering::SeqCst)
    }

    pub(crate) fn set_auto_execute(&self, enabled: bool) {
        self.auto_execute.store(enabled, Ordering::SeqCst);
    }

    /// Run up to `count` queued releases
    pub(crate) fn execute(&self, count: usize) -> usize {
        let mut queue = self.queue.lock();
        let semaphores = self.semaphores.lock();
        let mut executed = 0;

        while executed < count {
            let Some((va, payload)) = queue.pop_front() else {
                break;
            };
            if let Some((_, memory)) = semaphores.iter().find(|(addr, _)| *addr == va) {
                memory.store(payload, Ordering::Release);
            }
            executed += 1;
        }

        executed
    }

    pub(crate) fn execute_all(&self) -> usize {
        self.execute(usize::MAX)
    }
}

// =============================================================================
// SHARED STATE
// =============================================================================

#[derive(Default)]
struct MockShared {
    device: MockDevice,
    staged: Mutex<Vec<Vec<u32>>>,
    pushbuffer_completed: AtomicU32,
    pushbuffer_dropped: AtomicBool,
    fail_pushbuffer_begin: AtomicBool,
    fail_pushbuffer_create: AtomicBool,
    semaphores_allocated: AtomicU32,
    semaphores_freed: AtomicU32,
    ecc_enabled: AtomicBool,
    ecc_pending: AtomicBool,
}

// =============================================================================
// SEMAPHORE
// =============================================================================

pub(crate) struct MockSemaphore {
    va: GpuAddr,
    payload: Arc<AtomicU32>,
    shared: Arc<MockShared>,
}

impl GpuSemaphore for MockSemaphore {
    fn gpu_va(&self) -> GpuAddr {
        self.va
    }

    fn payload(&self) -> u32 {
        self.payload.load(Ordering::Acquire)
    }
}

impl Drop for MockSemaphore {
    fn drop(&mut self) {
        self.shared.semaphores_freed.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// PUSHBUFFER
// =============================================================================

pub(crate) struct MockPushbuffer {
    next_offset: AtomicU32,
    shared: Arc<MockShared>,
}

impl Pushbuffer for MockPushbuffer {
    fn begin_push(&self) -> Result<PushRegion> {
        if self.shared.fail_pushbuffer_begin.load(Ordering::SeqCst) {
            return Err(Error::OutOfMemory);
        }

        let offset = self.next_offset.fetch_add(PUSH_STRIDE, Ordering::SeqCst) % PUSHBUFFER_SIZE;
        Ok(PushRegion {
            offset,
            gpu_va: GpuAddr::new(PUSHBUFFER_BASE + offset as u64),
        })
    }

    fn end_push(&self, region: &PushRegion, stream: &PushStream) -> StagedRegion {
        let words = stream.words();
        for (i, word) in words.iter().enumerate() {
            if *word == TEST_SEMAPHORE_RELEASE && i + 3 < words.len() {
                let va = ((words[i + 1] as u64) << 32) | words[i + 2] as u64;
                self.shared.device.enqueue(va, words[i + 3]);
            }
        }
        self.shared.staged.lock().push(words.to_vec());

        StagedRegion {
            offset: region.offset,
            size: stream.size(),
        }
    }

    fn mark_completed(&self, _staged: StagedRegion) {
        self.shared.pushbuffer_completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockPushbuffer {
    fn drop(&mut self) {
        self.shared.pushbuffer_dropped.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// HALS
// =============================================================================

pub(crate) struct MockHost;

impl HostHal for MockHost {
    fn init(&self, push: &mut PushStream) {
        push.emit(&[TEST_HOST_INIT]);
    }
}

pub(crate) struct MockCe;

impl CeHal for MockCe {
    fn init(&self, push: &mut PushStream) {
        push.emit(&[TEST_CE_INIT]);
    }

    fn semaphore_release(&self, push: &mut PushStream, va: GpuAddr, payload: u32) {
        push.emit(&[TEST_SEMAPHORE_RELEASE, va.hi(), va.lo(), payload]);
    }
}

// =============================================================================
// CHANNEL AND RM
// =============================================================================

pub(crate) struct MockChannel {
    info: ChannelInfo,
    gpfifo: Vec<AtomicU64>,
    gp_put: AtomicU32,
    status: AtomicU16,
    shared: Arc<MockShared>,
}

impl MockChannel {
    pub(crate) fn gp_put(&self) -> u32 {
        self.gp_put.load(Ordering::SeqCst)
    }

    pub(crate) fn gpfifo_entry(&self, index: u32) -> u64 {
        self.gpfifo[index as usize].load(Ordering::SeqCst)
    }

    /// Set the error notifier status; zero clears it
    pub(crate) fn inject_fault(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }
}

impl HwChannel for MockChannel {
    fn info(&self) -> ChannelInfo {
        self.info
    }

    fn error_notifier_status(&self) -> u16 {
        self.status.load(Ordering::SeqCst)
    }

    fn write_gpfifo_entry(&self, index: u32, entry: u64) {
        self.gpfifo[index as usize].store(entry, Ordering::SeqCst);
    }

    fn write_gp_put(&self, put: u32) {
        self.gp_put.store(put, Ordering::SeqCst);

        // A faulted channel makes no progress
        if self.shared.device.auto_execute() && self.error_notifier_status() == 0 {
            self.shared.device.execute_all();
        }
    }
}

pub(crate) struct MockRm {
    num_entries: u32,
    shared: Arc<MockShared>,
    next_id: AtomicU32,
    attempts: AtomicU32,
    fail_at: AtomicU32,
    allocated: AtomicU32,
    destroyed: AtomicU32,
    fail_copy_engine: AtomicBool,
    fault_new: AtomicBool,
}

impl MockRm {
    /// Fail the `index`-th channel allocation, counting from zero
    pub(crate) fn fail_channel_alloc_at(&self, index: u32) {
        self.fail_at.store(index, Ordering::SeqCst);
    }

    pub(crate) fn fail_copy_engine_alloc(&self, fail: bool) {
        self.fail_copy_engine.store(fail, Ordering::SeqCst);
    }

    /// Hand out channels whose error notifier is already set
    pub(crate) fn fault_new_channels(&self, fault: bool) {
        self.fault_new.store(fault, Ordering::SeqCst);
    }

    pub(crate) fn channels_allocated(&self) -> u32 {
        self.allocated.load(Ordering::SeqCst)
    }

    pub(crate) fn channels_destroyed(&self) -> u32 {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl RmInterface for MockRm {
    type Channel = MockChannel;

    fn channel_allocate(&self) -> Result<MockChannel> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == self.fail_at.load(Ordering::SeqCst) {
            return Err(Error::HandleAllocationFailed);
        }
        self.allocated.fetch_add(1, Ordering::SeqCst);

        let status = if self.fault_new.load(Ordering::SeqCst) { 1 } else { 0 };
        Ok(MockChannel {
            info: ChannelInfo {
                num_gpfifo_entries: self.num_entries,
                hw_channel_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            },
            gpfifo: (0..self.num_entries).map(|_| AtomicU64::new(0)).collect(),
            gp_put: AtomicU32::new(0),
            status: AtomicU16::new(status),
            shared: self.shared.clone(),
        })
    }

    fn channel_destroy(&self, _channel: &MockChannel) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn copy_engine_alloc(&self, _channel: &MockChannel, _ce_index: u32) -> Result<()> {
        if self.fail_copy_engine.load(Ordering::SeqCst) {
            return Err(Error::HandleAllocationFailed);
        }
        Ok(())
    }
}

// =============================================================================
// GPU
// =============================================================================

pub(crate) struct MockGpu {
    name: String,
    caps: [CopyEngineCaps; COPY_ENGINE_COUNT_MAX],
    host: MockHost,
    ce: MockCe,
    rm: MockRm,
    shared: Arc<MockShared>,
}

impl MockGpu {
    /// Four interchangeable engines, every type eligible
    pub(crate) fn new(num_entries: u32) -> Self {
        let flags = CeCapFlags::SUPPORTED
            | CeCapFlags::SYSMEM
            | CeCapFlags::SYSMEM_READ
            | CeCapFlags::SYSMEM_WRITE
            | CeCapFlags::P2P;

        let mut caps = [CopyEngineCaps::unsupported(); COPY_ENGINE_COUNT_MAX];
        for ce in caps.iter_mut().take(4) {
            *ce = CopyEngineCaps::new(flags, 0x1);
        }

        Self::with_caps(num_entries, caps)
    }

    pub(crate) fn with_caps(num_entries: u32, caps: [CopyEngineCaps; COPY_ENGINE_COUNT_MAX]) -> Self {
        let shared = Arc::new(MockShared::default());

        Self {
            name: String::from("mock-gpu"),
            caps,
            host: MockHost,
            ce: MockCe,
            rm: MockRm {
                num_entries,
                shared: shared.clone(),
                next_id: AtomicU32::new(0x10),
                attempts: AtomicU32::new(0),
                fail_at: AtomicU32::new(u32::MAX),
                allocated: AtomicU32::new(0),
                destroyed: AtomicU32::new(0),
                fail_copy_engine: AtomicBool::new(false),
                fault_new: AtomicBool::new(false),
            },
            shared,
        }
    }

    pub(crate) fn device(&self) -> &MockDevice {
        &self.shared.device
    }

    pub(crate) fn set_ecc(&self, enabled: bool, pending: bool) {
        self.shared.ecc_enabled.store(enabled, Ordering::SeqCst);
        self.shared.ecc_pending.store(pending, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_pushbuffer_begin(&self, fail: bool) {
        self.shared.fail_pushbuffer_begin.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_pushbuffer_create(&self, fail: bool) {
        self.shared.fail_pushbuffer_create.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn pushbuffer_completed(&self) -> u32 {
        self.shared.pushbuffer_completed.load(Ordering::SeqCst)
    }

    pub(crate) fn pushbuffer_dropped(&self) -> bool {
        self.shared.pushbuffer_dropped.load(Ordering::SeqCst)
    }

    pub(crate) fn semaphores_allocated(&self) -> u32 {
        self.shared.semaphores_allocated.load(Ordering::SeqCst)
    }

    pub(crate) fn semaphores_freed(&self) -> u32 {
        self.shared.semaphores_freed.load(Ordering::SeqCst)
    }

    pub(crate) fn staged_words_history(&self) -> Vec<Vec<u32>> {
        self.shared.staged.lock().clone()
    }

    pub(crate) fn last_staged_words(&self) -> Vec<u32> {
        self.shared.staged.lock().last().cloned().unwrap_or_default()
    }
}

impl Gpu for MockGpu {
    type Host = MockHost;
    type Ce = MockCe;
    type Rm = MockRm;
    type Semaphore = MockSemaphore;
    type Pushbuffer = MockPushbuffer;

    fn name(&self) -> &str {
        &self.name
    }

    fn host_hal(&self) -> &MockHost {
        &self.host
    }

    fn ce_hal(&self) -> &MockCe {
        &self.ce
    }

    fn rm(&self) -> &MockRm {
        &self.rm
    }

    fn ce_caps(&self) -> &[CopyEngineCaps; COPY_ENGINE_COUNT_MAX] {
        &self.caps
    }

    fn ecc_enabled(&self) -> bool {
        self.shared.ecc_enabled.load(Ordering::SeqCst)
    }

    fn ecc_error_pending(&self) -> bool {
        self.shared.ecc_pending.load(Ordering::SeqCst)
    }

    fn semaphore_alloc(&self) -> Result<MockSemaphore> {
        let index = self.shared.semaphores_allocated.fetch_add(1, Ordering::SeqCst);
        let va = SEMAPHORE_BASE + index as u64 * 0x10;
        let payload = Arc::new(AtomicU32::new(0));
        self.shared.device.register(va, payload.clone());

        Ok(MockSemaphore {
            va: GpuAddr::new(va),
            payload,
            shared: self.shared.clone(),
        })
    }

    fn pushbuffer_create(&self) -> Result<MockPushbuffer> {
        if self.shared.fail_pushbuffer_create.load(Ordering::SeqCst) {
            return Err(Error::OutOfMemory);
        }

        Ok(MockPushbuffer {
            next_offset: AtomicU32::new(0),
            shared: self.shared.clone(),
        })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Shared channel context with a fresh global status
pub(crate) fn context(gpu: Arc<MockGpu>, config: ManagerConfig) -> Arc<ChannelContext<MockGpu>> {
    let pushbuffer = gpu.pushbuffer_create().unwrap();

    Arc::new(ChannelContext {
        gpu,
        pushbuffer,
        global: Arc::new(GlobalStatus::new()),
        config,
    })
}

/// Create a manager, executing init pushes as they are submitted
pub(crate) fn manager(gpu: &Arc<MockGpu>, config: ManagerConfig) -> Result<ChannelManager<MockGpu>> {
    let auto = gpu.device().auto_execute();
    gpu.device().set_auto_execute(true);

    let result = ChannelManager::create(gpu.clone(), Arc::new(GlobalStatus::new()), config);

    gpu.device().set_auto_execute(auto);
    result
}
