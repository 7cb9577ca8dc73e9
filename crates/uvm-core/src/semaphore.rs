//! # Tracking Semaphores
//!
//! Monotonic 64-bit completion tracking on top of a 32-bit device semaphore.
//!
//! The device releases only the low 32 bits of each tracking value. The CPU
//! side keeps the last observed 64-bit completed value and widens every
//! fresh payload against it: if the low word went backwards the counter
//! rolled over. This stays correct as long as the completed value is
//! refreshed at least once every 2^32 releases, which the channel's ring
//! capacity guarantees.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::types::GpuAddr;

const PAYLOAD_MASK: u64 = 0xFFFF_FFFF;

// =============================================================================
// DEVICE SEMAPHORE
// =============================================================================

/// A device-writable 32-bit semaphore
///
/// Implementations wrap memory the GPU releases payloads into. Allocation and
/// release belong to the owning GPU's semaphore pool; dropping the handle
/// returns it.
pub trait GpuSemaphore: Send + Sync {
    /// GPU virtual address the device writes the payload to
    fn gpu_va(&self) -> GpuAddr;

    /// Latest payload written by the device
    fn payload(&self) -> u32;
}

// =============================================================================
// TRACKING SEMAPHORE
// =============================================================================

/// Monotonic completion counter for one channel
#[derive(Debug)]
pub struct TrackingSemaphore<S> {
    /// Backing device semaphore
    semaphore: S,
    /// Last value handed out for a submission
    queued_value: AtomicU64,
    /// Last value observed complete
    completed_value: AtomicU64,
    /// Serializes read-widen-store of `completed_value`
    update_lock: Mutex<()>,
}

impl<S: GpuSemaphore> TrackingSemaphore<S> {
    /// Wrap a freshly allocated semaphore.
    ///
    /// The device payload is expected to start at zero.
    pub fn new(semaphore: S) -> Self {
        Self {
            semaphore,
            queued_value: AtomicU64::new(0),
            completed_value: AtomicU64::new(0),
            update_lock: Mutex::new(()),
        }
    }

    /// Backing device semaphore
    pub fn semaphore(&self) -> &S {
        &self.semaphore
    }

    /// Last queued value
    #[inline]
    pub fn queued_value(&self) -> u64 {
        self.queued_value.load(Ordering::Acquire)
    }

    /// Reserve the next tracking value.
    ///
    /// Callers serialize this with the submission that releases the value.
    pub fn queue_next(&self) -> u64 {
        self.queued_value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Cached completed value, no device read
    #[inline]
    pub fn cached_completed_value(&self) -> u64 {
        self.completed_value.load(Ordering::Acquire)
    }

    /// Check a value against the cached completed value only
    #[inline]
    pub fn is_value_completed(&self, value: u64) -> bool {
        value <= self.cached_completed_value()
    }

    /// Read the device payload and return the widened completed value.
    ///
    /// Never goes backwards, whatever the interleaving of callers.
    pub fn update_completed_value(&self) -> u64 {
        let _guard = self.update_lock.lock();

        let old_value = self.completed_value.load(Ordering::Acquire);
        let payload = self.semaphore.payload() as u64;

        let mut new_value = (old_value & !PAYLOAD_MASK) | payload;
        if new_value < old_value {
            new_value += PAYLOAD_MASK + 1;
        }

        // A payload ahead of anything queued can only be a stale high word
        // from a previous wrap; keep the old value rather than jump forward.
        if new_value > self.queued_value() {
            return old_value;
        }

        self.completed_value.store(new_value, Ordering::Release);
        new_value
    }

    /// Check if everything queued so far has completed
    pub fn is_completed(&self) -> bool {
        let queued = self.queued_value();
        self.is_value_completed(queued) || self.update_completed_value() >= queued
    }
}
