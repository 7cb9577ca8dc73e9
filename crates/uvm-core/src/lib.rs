//! # UVM Core
//!
//! Foundational types shared by the unified-memory channel stack.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         uvm-core                            │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Error     │  │  Global     │  │  Tracking           │  │
//! │  │  (taxonomy) │  │  Status     │  │  Semaphore          │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │  ┌─────────────┐  ┌─────────────┐                           │
//! │  │  GpuAddr    │  │  SpinLoop   │                           │
//! │  └─────────────┘  └─────────────┘                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is `no_std` + `alloc`. The `std` feature only lets the
//! backoff loop yield the thread once it stops making progress.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod global;
pub mod semaphore;
pub mod spin_loop;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use global::GlobalStatus;
pub use semaphore::{GpuSemaphore, TrackingSemaphore};
pub use spin_loop::{SpinConfig, SpinLoop};
pub use types::GpuAddr;
