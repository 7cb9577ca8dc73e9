//! # UVM Channel Manager
//!
//! Multiplexes software-issued copy work onto a fixed set of hardware
//! channels and tracks its completion.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          ChannelManager                           │
//! │                                                                   │
//! │  ┌─────────────┐  ┌─────────────┐        ┌─────────────┐          │
//! │  │ Pool        │  │ Pool        │  ...   │ Pool        │          │
//! │  │ CPU_TO_GPU  │  │ GPU_TO_CPU  │        │ GPU_TO_GPU  │          │
//! │  └──────┬──────┘  └─────────────┘        └─────────────┘          │
//! │         │                                                         │
//! │  ┌──────▼────────────────────────────────────────────────────┐    │
//! │  │ Channel (one lock)                                        │    │
//! │  │  GPFIFO ring ── push info slots ── tracking semaphore     │    │
//! │  └──────┬────────────────────────────────────────────────────┘    │
//! │         │ doorbell                       ▲ semaphore release      │
//! └─────────┼────────────────────────────────┼────────────────────────┘
//!           ▼                                │
//!     ┌──────────────────────────────────────┴───┐
//!     │            Copy engine (GPU)             │
//!     └──────────────────────────────────────────┘
//! ```
//!
//! ## Submission Flow
//!
//! 1. Reserve a channel of a type: claim a free GPFIFO slot on any member
//! 2. Begin a push: take pushbuffer space and a push info slot
//! 3. Record methods into the push
//! 4. End the push: release the next tracking value, write the GPFIFO
//!    entry, ring the doorbell
//! 5. Progress updates retire entries whose tracking value completed

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

pub mod ce_select;
pub mod channel;
pub mod channel_type;
pub mod diag;
pub mod manager;
pub mod pool;
pub mod push;
pub mod push_info;
pub mod ring;

#[cfg(test)]
mod mock;

// Re-exports
pub use ce_select::{pick_copy_engines, EngineAssignment};
pub use channel::Channel;
pub use channel_type::ChannelType;
pub use diag::{ChannelSnapshot, PushRecord};
pub use manager::{ChannelManager, ManagerConfig};
pub use pool::ChannelPool;
pub use push::Push;
pub use push_info::{CompletionCallback, PushInfo};
pub use ring::{GpfifoEntry, GpfifoRing, UpdateMode};
