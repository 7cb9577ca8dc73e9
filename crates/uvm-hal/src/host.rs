//! # Host and Copy Engine HALs
//!
//! Method encoders the channel manager drives. Only the GPFIFO entry layout
//! is fixed here; everything else is per-architecture.

use uvm_core::GpuAddr;

use crate::push::PushStream;
use crate::HwChannel;

/// Size of one GPFIFO entry in bytes
pub const GPFIFO_ENTRY_SIZE: usize = 8;

static_assertions::const_assert_eq!(GPFIFO_ENTRY_SIZE, core::mem::size_of::<u64>());

/// Encode a GPFIFO entry pointing at `size` bytes of methods at `va`.
///
/// Kepler+ layout: dword 0 holds VA bits [31:2], dword 1 holds VA bits
/// [39:32] and the length in dwords starting at bit 10.
pub const fn encode_gpfifo_entry(va: GpuAddr, size: u32) -> u64 {
    let lo = va.lo() & !0x3;
    let hi = (va.hi() & 0xff) | ((size / 4) << 10);
    ((hi as u64) << 32) | lo as u64
}

// =============================================================================
// HOST HAL
// =============================================================================

/// Host method encoder and doorbell access
pub trait HostHal: Send + Sync {
    /// Encode a GPFIFO entry for a push
    fn set_gpfifo_entry(&self, pushbuffer_va: GpuAddr, push_size: u32) -> u64 {
        encode_gpfifo_entry(pushbuffer_va, push_size)
    }

    /// Ring the channel doorbell with the new put index
    fn write_gpu_put<C: HwChannel>(&self, channel: &C, put: u32) {
        channel.write_gp_put(put);
    }

    /// One-time host setup methods for a new channel
    fn init(&self, push: &mut PushStream);
}

// =============================================================================
// COPY ENGINE HAL
// =============================================================================

/// Copy engine method encoder
pub trait CeHal: Send + Sync {
    /// One-time copy engine setup methods for a new channel
    fn init(&self, push: &mut PushStream);

    /// Release `payload` to the semaphore at `va` once prior work is done
    fn semaphore_release(&self, push: &mut PushStream, va: GpuAddr, payload: u32);
}
