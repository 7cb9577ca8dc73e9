//! # Channel
//!
//! One hardware channel plus its CPU-side bookkeeping.
//!
//! ```text
//!   reserve ──▶ begin_push ──▶ (record) ──▶ end_push ──▶ doorbell
//!      │                                        │
//!      │ claim                                  │ tracking value N
//!      ▼                                        ▼
//!  ┌──────────────────── state lock ─────────────────────┐
//!  │  GpfifoRing (put/get/claims)    PushInfoPool         │
//!  └──────────────────────────────────────────────────────┘
//!      ▲
//!      │ retire entries ≤ completed value
//!  update_progress ◀── TrackingSemaphore ◀── device release
//! ```
//!
//! All ring and slot state sits behind a single spin lock. Critical sections
//! are bounded by the progress budget and never wait on the device.

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::panic::Location;

use spin::Mutex;

use uvm_core::{Error, GlobalStatus, GpuSemaphore, Result, SpinLoop, TrackingSemaphore};
use uvm_hal::mmio::barrier;
use uvm_hal::{
    CeHal, ChannelInfo, Gpu, HostHal, HwChannel, HwChannelOf, PushRegion, PushStream, Pushbuffer, RmInterface,
    MAX_PUSH_SIZE,
};

use crate::channel_type::ChannelType;
use crate::diag::PushRecord;
use crate::manager::ManagerConfig;
use crate::push_info::{CompletionCallback, PushInfo, PushInfoPool};
use crate::ring::{GpfifoEntry, GpfifoRing, UpdateMode};

// =============================================================================
// SHARED CONTEXT
// =============================================================================

/// State shared by every channel of a manager.
///
/// Channels hold it through an `Arc`, so the pushbuffer outlives all of them.
pub(crate) struct ChannelContext<G: Gpu> {
    pub(crate) gpu: Arc<G>,
    pub(crate) pushbuffer: G::Pushbuffer,
    pub(crate) global: Arc<GlobalStatus>,
    pub(crate) config: ManagerConfig,
}

// =============================================================================
// CHANNEL STATE
// =============================================================================

/// Everything guarded by the channel lock
#[derive(Debug)]
pub(crate) struct ChannelState {
    pub(crate) ring: GpfifoRing,
    pub(crate) push_infos: PushInfoPool,
}

impl ChannelState {
    fn new(num_entries: u32) -> Result<Self> {
        Ok(Self {
            ring: GpfifoRing::new(num_entries)?,
            push_infos: PushInfoPool::new(num_entries)?,
        })
    }
}

// =============================================================================
// CHANNEL
// =============================================================================

/// A hardware channel bound to one copy engine
pub struct Channel<G: Gpu> {
    ctx: Arc<ChannelContext<G>>,
    channel_type: ChannelType,
    ce_index: u32,
    name: String,
    hw: HwChannelOf<G>,
    info: ChannelInfo,
    tracking: TrackingSemaphore<G::Semaphore>,
    pub(crate) state: Mutex<ChannelState>,
}

impl<G: Gpu> Channel<G> {
    /// Allocate a channel of `channel_type` on copy engine `ce_index`
    pub(crate) fn create(ctx: &Arc<ChannelContext<G>>, channel_type: ChannelType, ce_index: u32) -> Result<Self> {
        let gpu = &ctx.gpu;

        let semaphore = gpu.semaphore_alloc().map_err(|err| {
            log::error!("Failed to allocate tracking semaphore: {}, GPU {}", err, gpu.name());
            err
        })?;

        let hw = gpu.rm().channel_allocate().map_err(|err| {
            log::error!("Failed to allocate channel: {}, GPU {}", err, gpu.name());
            err
        })?;

        let info = hw.info();
        let state = match ChannelState::new(info.num_gpfifo_entries) {
            Ok(state) => state,
            Err(err) => {
                log::error!(
                    "Failed to allocate state for {} GPFIFO entries: {}, GPU {}",
                    info.num_gpfifo_entries,
                    err,
                    gpu.name()
                );
                gpu.rm().channel_destroy(&hw);
                return Err(err);
            },
        };

        let channel = Self {
            ctx: ctx.clone(),
            channel_type,
            ce_index,
            name: format!(
                "{} ID {} (0x{:x}) CE {}",
                channel_type, info.hw_channel_id, info.hw_channel_id, ce_index
            ),
            hw,
            info,
            tracking: TrackingSemaphore::new(semaphore),
            state: Mutex::new(state),
        };

        // From here on Drop releases the hardware channel
        gpu.rm().copy_engine_alloc(&channel.hw, ce_index).map_err(|err| {
            log::error!("Failed to allocate CE {}: {}, GPU {}", ce_index, err, gpu.name());
            err
        })?;

        log::debug!("Created channel {}", channel.name);
        Ok(channel)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Get name, `"<TYPE> ID <id> (0x<id>) CE <ce>"`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get channel type
    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    /// Get copy engine index
    pub fn ce_index(&self) -> u32 {
        self.ce_index
    }

    /// Get hardware channel ID
    pub fn hw_channel_id(&self) -> u32 {
        self.info.hw_channel_id
    }

    /// Get ring capacity
    pub fn num_gpfifo_entries(&self) -> u32 {
        self.info.num_gpfifo_entries
    }

    /// Get the underlying hardware channel
    pub fn hw(&self) -> &HwChannelOf<G> {
        &self.hw
    }

    /// Get the tracking semaphore
    pub fn tracking(&self) -> &TrackingSemaphore<G::Semaphore> {
        &self.tracking
    }

    /// Last tracking value handed out
    pub fn queued_value(&self) -> u64 {
        self.tracking.queued_value()
    }

    pub(crate) fn gpu(&self) -> &G {
        &self.ctx.gpu
    }

    // -------------------------------------------------------------------------
    // Claims
    // -------------------------------------------------------------------------

    /// Claim a GPFIFO slot without waiting.
    ///
    /// Never succeeds once a fatal status is latched.
    pub fn try_claim(&self) -> bool {
        if self.ctx.global.is_fatal() {
            return false;
        }
        self.state.lock().ring.try_claim()
    }

    /// Whether a claim would currently succeed
    pub fn is_available(&self) -> bool {
        self.state.lock().ring.is_available()
    }

    /// Claim a GPFIFO slot, waiting for the device if the ring is full.
    ///
    /// Only a fatal status ends the wait.
    pub fn reserve(&self) -> Result<()> {
        self.ctx.global.get()?;

        if self.try_claim() {
            return Ok(());
        }

        let mut spin = SpinLoop::new(self.ctx.config.spin);
        loop {
            self.update_progress();
            self.check_errors()?;

            if self.try_claim() {
                return Ok(());
            }

            spin.spin()?;
        }
    }

    // -------------------------------------------------------------------------
    // Progress
    // -------------------------------------------------------------------------

    /// Retire up to `max` entries and return how many are still pending.
    ///
    /// Completion callbacks of retired pushes run after the lock is dropped.
    pub fn update_progress_with_max(&self, max: u32, mode: UpdateMode) -> u32 {
        let completed = self.tracking.update_completed_value();
        let mut callbacks: Vec<CompletionCallback> = Vec::new();

        let pending = {
            let mut state = self.state.lock();
            let ChannelState { ring, push_infos } = &mut *state;
            let pushbuffer = &self.ctx.pushbuffer;

            ring.retire(max, mode, completed, |entry| {
                pushbuffer.mark_completed(entry.staged);
                if let Some(callback) = entry.push_info.and_then(|index| push_infos.release(index)) {
                    callbacks.push(callback);
                }
            })
        };

        for callback in callbacks {
            callback();
        }

        pending
    }

    /// Retire completed entries within the configured budget
    pub fn update_progress(&self) -> u32 {
        self.update_progress_with_max(self.ctx.config.progress_budget, UpdateMode::Completed)
    }

    /// Retire every completed entry
    pub fn update_progress_all(&self) -> u32 {
        self.update_progress_with_max(self.num_gpfifo_entries(), UpdateMode::Completed)
    }

    /// Retire every entry whether or not the device finished it
    pub(crate) fn force_drain(&self) -> u32 {
        self.update_progress_with_max(self.num_gpfifo_entries(), UpdateMode::ForceAll)
    }

    /// Submitted entries not yet retired
    pub fn pending_count(&self) -> u32 {
        self.state.lock().ring.pending_count()
    }

    // -------------------------------------------------------------------------
    // Completion
    // -------------------------------------------------------------------------

    /// Check `value` against the cached completed value, no device read
    pub fn is_value_completed(&self, value: u64) -> bool {
        self.tracking.is_value_completed(value)
    }

    /// Read the device payload and return the completed value
    pub fn update_completed_value(&self) -> u64 {
        self.tracking.update_completed_value()
    }

    /// Wait until `value` completes or a fatal status appears
    pub fn wait_for_value(&self, value: u64) -> Result<()> {
        let mut spin = SpinLoop::new(self.ctx.config.spin);
        loop {
            if self.is_value_completed(value) || self.update_completed_value() >= value {
                return Ok(());
            }

            self.check_errors()?;
            spin.spin()?;
        }
    }

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------

    /// Hardware status of this channel only
    pub fn get_status(&self) -> Result<()> {
        if self.hw.error_notifier_status() == 0 {
            return Ok(());
        }

        // Racy: the ECC notifier may be set slightly after the channel one
        let gpu = self.gpu();
        if gpu.ecc_enabled() && gpu.ecc_error_pending() {
            Err(Error::MemoryCorrectionFault)
        } else {
            Err(Error::RuntimeFault)
        }
    }

    /// Check global and channel health, latching a channel fault globally
    pub fn check_errors(&self) -> Result<()> {
        self.ctx.global.get()?;

        let status = match self.get_status() {
            Ok(()) => return Ok(()),
            Err(status) => status,
        };

        log::error!("Detected a channel error, channel {} GPU {}", self.name, self.gpu().name());

        if let Some(record) = self.fatal_entry() {
            log::error!("Channel error likely caused by {}", record);
        }

        Err(self.ctx.global.set_fatal(status))
    }

    /// Oldest entry the device has not completed.
    ///
    /// Completed entries are retired first so the head of the ring is the
    /// push that was executing when the channel faulted.
    pub fn fatal_entry(&self) -> Option<PushRecord> {
        self.update_progress_all();

        let state = self.state.lock();
        let entry = state.ring.first_pending()?;
        Some(PushRecord::from_entry(entry, &state.push_infos, false))
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Take pushbuffer space and a push info slot for a claimed slot.
    ///
    /// On failure the claim is returned.
    pub(crate) fn begin_push(
        &self,
        description: String,
        location: &'static Location<'static>,
    ) -> Result<(PushRegion, u32)> {
        let region = match self.ctx.pushbuffer.begin_push() {
            Ok(region) => region,
            Err(err) => {
                self.state.lock().ring.release_claim();
                return Err(err);
            },
        };

        let index = self
            .state
            .lock()
            .push_infos
            .acquire(PushInfo::new(description, location))
            .expect("no free push info slot after a successful reserve");

        Ok((region, index))
    }

    pub(crate) fn set_on_complete(&self, push_info: u32, callback: CompletionCallback) {
        self.state.lock().push_infos.set_on_complete(push_info, callback);
    }

    /// Submit a recorded push and return its tracking value
    pub(crate) fn end_push(&self, region: &PushRegion, stream: &mut PushStream, push_info: u32) -> u64 {
        let gpu = self.gpu();
        let host = gpu.host_hal();

        let value = {
            let mut state = self.state.lock();

            let value = self.tracking.queue_next();
            gpu.ce_hal()
                .semaphore_release(stream, self.tracking.semaphore().gpu_va(), value as u32);

            let staged = self.ctx.pushbuffer.end_push(region, stream);
            assert!(
                staged.size <= MAX_PUSH_SIZE,
                "push of {} bytes exceeds the {} byte limit",
                staged.size,
                MAX_PUSH_SIZE
            );

            let (index, put) = state.ring.submit(GpfifoEntry {
                tracking_value: value,
                staged,
                push_info: Some(push_info),
            });

            self.hw
                .write_gpfifo_entry(index, host.set_gpfifo_entry(region.gpu_va, staged.size));

            // Entry must be visible before GP_PUT moves past it
            barrier::full();
            host.write_gpu_put(&self.hw, put);

            value
        };

        // Flush the doorbell out of any write-combining buffer
        barrier::store();

        value
    }
}

impl<G: Gpu> fmt::Debug for Channel<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("queued", &self.tracking.queued_value())
            .field("completed", &self.tracking.cached_completed_value())
            .finish()
    }
}

impl<G: Gpu> Drop for Channel<G> {
    fn drop(&mut self) {
        if self.tracking.queued_value() > 0 {
            let healthy = self.ctx.global.get().is_ok() && self.get_status().is_ok();
            if healthy && !self.tracking.is_completed() {
                log::warn!(
                    "Channel {} destroyed with work pending: queued {} completed {}",
                    self.name,
                    self.tracking.queued_value(),
                    self.tracking.cached_completed_value()
                );
            }

            // The pushbuffer lives longer than the channel
            self.force_drain();
        }

        self.ctx.gpu.rm().channel_destroy(&self.hw);
        log::debug!("Destroyed channel {}", self.name);
    }
}
