//! # UVM Hardware Contracts
//!
//! Everything the channel manager consumes but does not implement itself.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! Gpu
//!  │
//!  ├── HostHal       (GPFIFO entry encoding, GP_PUT doorbell, host init)
//!  ├── CeHal         (semaphore release, copy engine init)
//!  ├── RmInterface   (channel / copy engine handle allocation)
//!  │      │
//!  │      └── HwChannel  (ring memory, doorbell, error notifier)
//!  ├── Pushbuffer    (staging memory for pushes)
//!  └── GpuSemaphore  (device-writable tracking payload)
//! ```
//!
//! Generic parameters rather than trait objects keep the submission path free
//! of dynamic dispatch.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

pub mod ce;
pub mod host;
pub mod mmio;
pub mod push;

pub use ce::{CeCapFlags, CopyEngineCaps, COPY_ENGINE_COUNT_MAX};
pub use host::{encode_gpfifo_entry, CeHal, HostHal, GPFIFO_ENTRY_SIZE};
pub use mmio::{ErrorNotification, UsermodeChannel};
pub use push::{PushRegion, PushStream, Pushbuffer, StagedRegion, MAX_PUSH_SIZE};

use uvm_core::{GpuSemaphore, Result};

// =============================================================================
// RESOURCE MANAGER
// =============================================================================

/// Static properties of a channel allocated by the resource manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Number of GPFIFO entries in the ring
    pub num_gpfifo_entries: u32,
    /// Hardware channel ID
    pub hw_channel_id: u32,
}

/// A raw hardware channel handed out by the resource manager
pub trait HwChannel: Send + Sync {
    /// Ring capacity and hardware ID
    fn info(&self) -> ChannelInfo;

    /// Status word of the channel's error notifier, zero while healthy
    fn error_notifier_status(&self) -> u16;

    /// Store an encoded entry into the device-visible GPFIFO
    fn write_gpfifo_entry(&self, index: u32, entry: u64);

    /// Write the GP_PUT doorbell register
    fn write_gp_put(&self, put: u32);
}

/// Blocking, fallible handle allocation through the resource manager
pub trait RmInterface: Send + Sync {
    /// Channel handle type
    type Channel: HwChannel;

    /// Allocate a hardware channel
    fn channel_allocate(&self) -> Result<Self::Channel>;

    /// Destroy a hardware channel and everything bound to it
    fn channel_destroy(&self, channel: &Self::Channel);

    /// Bind copy engine `ce_index` to `channel`
    fn copy_engine_alloc(&self, channel: &Self::Channel, ce_index: u32) -> Result<()>;
}

// =============================================================================
// GPU FACADE
// =============================================================================

/// One GPU as seen by the channel manager
pub trait Gpu: Send + Sync {
    /// Host (PBDMA) method encoder
    type Host: HostHal;
    /// Copy engine method encoder
    type Ce: CeHal;
    /// Resource manager binding
    type Rm: RmInterface;
    /// Tracking semaphore storage
    type Semaphore: GpuSemaphore;
    /// Staging memory for pushes
    type Pushbuffer: Pushbuffer;

    /// Name used in logs
    fn name(&self) -> &str;

    /// Host HAL
    fn host_hal(&self) -> &Self::Host;

    /// Copy engine HAL
    fn ce_hal(&self) -> &Self::Ce;

    /// Resource manager
    fn rm(&self) -> &Self::Rm;

    /// Capabilities of every copy engine, indexed by CE number
    fn ce_caps(&self) -> &[CopyEngineCaps; COPY_ENGINE_COUNT_MAX];

    /// Whether ECC is enabled
    fn ecc_enabled(&self) -> bool;

    /// Whether the ECC error notifier is currently set
    fn ecc_error_pending(&self) -> bool;

    /// Allocate a tracking semaphore
    fn semaphore_alloc(&self) -> Result<Self::Semaphore>;

    /// Allocate the shared pushbuffer
    fn pushbuffer_create(&self) -> Result<Self::Pushbuffer>;
}

/// Hardware channel type of a GPU
pub type HwChannelOf<G> = <<G as Gpu>::Rm as RmInterface>::Channel;
