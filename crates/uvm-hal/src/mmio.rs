//! # Usermode Channel MMIO
//!
//! Hardware channel backed by the mappings the resource manager returns:
//! the GPFIFO ring, the GP_PUT doorbell and the error notifier.

use core::ptr::NonNull;

use uvm_core::{Error, Result};

use crate::{ChannelInfo, HwChannel};

// =============================================================================
// ERROR NOTIFIER
// =============================================================================

/// Notifier record the device fills in when a channel faults
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct ErrorNotification {
    /// Fault timestamp, nanoseconds
    pub time_stamp: [u32; 2],
    /// Extra info word
    pub info32: u32,
    /// Extra info half-word
    pub info16: u16,
    /// Zero while the channel is healthy
    pub status: u16,
}

static_assertions::assert_eq_size!(ErrorNotification, [u8; 16]);

// =============================================================================
// USERMODE CHANNEL
// =============================================================================

/// Channel whose ring and doorbell are mapped into the CPU address space
#[derive(Debug)]
pub struct UsermodeChannel {
    info: ChannelInfo,
    /// First GPFIFO entry
    gpfifo: NonNull<u64>,
    /// GP_PUT register
    gp_put: NonNull<u32>,
    /// Device-written error notifier
    error_notifier: NonNull<ErrorNotification>,
}

impl UsermodeChannel {
    /// Wrap raw channel mappings.
    ///
    /// # Safety
    /// - `gpfifo` must point to `info.num_gpfifo_entries` writable entries
    /// - `gp_put` and `error_notifier` must be valid, aligned mappings
    /// - All mappings must outlive the returned channel
    pub unsafe fn new(
        info: ChannelInfo,
        gpfifo: *mut u64,
        gp_put: *mut u32,
        error_notifier: *const ErrorNotification,
    ) -> Result<Self> {
        if info.num_gpfifo_entries < 2 {
            log::error!("Channel {} has only {} GPFIFO entries", info.hw_channel_id, info.num_gpfifo_entries);
            return Err(Error::InvalidParameter);
        }

        match (
            NonNull::new(gpfifo),
            NonNull::new(gp_put),
            NonNull::new(error_notifier as *mut ErrorNotification),
        ) {
            (Some(gpfifo), Some(gp_put), Some(error_notifier)) => Ok(Self {
                info,
                gpfifo,
                gp_put,
                error_notifier,
            }),
            _ => {
                log::error!("Channel {} is missing a mapping", info.hw_channel_id);
                Err(Error::InvalidParameter)
            },
        }
    }
}

impl HwChannel for UsermodeChannel {
    fn info(&self) -> ChannelInfo {
        self.info
    }

    fn error_notifier_status(&self) -> u16 {
        // SAFETY: mapping validity guaranteed by constructor contract
        let notifier = unsafe { core::ptr::read_volatile(self.error_notifier.as_ptr()) };
        notifier.status
    }

    fn write_gpfifo_entry(&self, index: u32, entry: u64) {
        assert!(index < self.info.num_gpfifo_entries);
        // SAFETY: index bounds-checked above, mapping valid per constructor
        unsafe { core::ptr::write_volatile(self.gpfifo.as_ptr().add(index as usize), entry) }
    }

    fn write_gp_put(&self, put: u32) {
        // SAFETY: mapping validity guaranteed by constructor contract
        unsafe { core::ptr::write_volatile(self.gp_put.as_ptr(), put) }
    }
}

// SAFETY: the mappings are device memory shared with the GPU; all accesses
// are volatile and writers are serialized by the owning channel's lock.
unsafe impl Send for UsermodeChannel {}
unsafe impl Sync for UsermodeChannel {}

// =============================================================================
// MEMORY BARRIERS
// =============================================================================

/// Barriers around doorbell writes
pub mod barrier {
    //! Memory barrier operations

    use core::sync::atomic::{fence, Ordering};

    /// Full barrier: everything before is visible before anything after
    #[inline(always)]
    pub fn full() {
        fence(Ordering::SeqCst);
    }

    /// Store barrier: flush posted/write-combined stores
    #[inline(always)]
    pub fn store() {
        #[cfg(target_arch = "aarch64")]
        {
            // SAFETY: This is a memory barrier instruction
            unsafe {
                core::arch::asm!("dsb st", options(nostack, preserves_flags));
            }
        }

        #[cfg(not(target_arch = "aarch64"))]
        {
            fence(Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_rejects_null_mappings() {
        let info = ChannelInfo {
            num_gpfifo_entries: 4,
            hw_channel_id: 7,
        };
        let mut put = 0u32;
        let notifier = ErrorNotification::default();
        // SAFETY: null is rejected before any access
        let result = unsafe { UsermodeChannel::new(info, core::ptr::null_mut(), &mut put, &notifier) };
        assert_eq!(result.err(), Some(Error::InvalidParameter));
    }

    #[test]
    fn test_writes_reach_mappings() {
        let info = ChannelInfo {
            num_gpfifo_entries: 4,
            hw_channel_id: 3,
        };
        let mut ring = vec![0u64; 4];
        let mut put = 0u32;
        let mut notifier = ErrorNotification::default();

        {
            // SAFETY: all mappings are live locals that outlive the channel
            let channel = unsafe { UsermodeChannel::new(info, ring.as_mut_ptr(), &mut put, &notifier) }.unwrap();
            channel.write_gpfifo_entry(2, 0xdead_beef);
            channel.write_gp_put(3);
            assert_eq!(channel.error_notifier_status(), 0);
        }
        assert_eq!(ring[2], 0xdead_beef);
        assert_eq!(put, 3);

        notifier.status = 0x1f;
        // SAFETY: as above
        let channel = unsafe { UsermodeChannel::new(info, ring.as_mut_ptr(), &mut put, &notifier) }.unwrap();
        assert_eq!(channel.error_notifier_status(), 0x1f);
    }
}
