//! # Push Staging
//!
//! Method stream recorded for one push and the pushbuffer contract that
//! places it in GPU-visible memory.
//!
//! ```text
//!   begin_push()          emit()/HAL methods         end_push()
//! ┌──────────────┐     ┌──────────────────────┐     ┌──────────────┐
//! │  PushRegion  │────▶│      PushStream      │────▶│ StagedRegion │
//! │ offset, VA   │     │   CPU-side dwords    │     │ offset, size │
//! └──────────────┘     └──────────────────────┘     └──────┬───────┘
//!                                                          │ retired
//!                                                   mark_completed()
//! ```

use alloc::vec::Vec;

use uvm_core::{GpuAddr, Result};

/// Largest push the pushbuffer accepts, in bytes
pub const MAX_PUSH_SIZE: u32 = 128 * 1024;

// =============================================================================
// REGIONS
// =============================================================================

/// Pushbuffer space reserved for a push being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushRegion {
    /// Offset of the region inside the pushbuffer
    pub offset: u32,
    /// GPU VA of the region
    pub gpu_va: GpuAddr,
}

/// Pushbuffer bytes consumed by one submitted ring entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StagedRegion {
    /// Offset inside the pushbuffer
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

// =============================================================================
// PUSH STREAM
// =============================================================================

/// Methods recorded for one push, in dwords
#[derive(Debug, Default, Clone)]
pub struct PushStream {
    words: Vec<u32>,
}

impl PushStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Append raw method dwords
    pub fn emit(&mut self, words: &[u32]) {
        self.words.extend_from_slice(words);
    }

    /// Recorded dwords
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Size in bytes
    pub fn size(&self) -> u32 {
        (self.words.len() * core::mem::size_of::<u32>()) as u32
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

// =============================================================================
// PUSHBUFFER
// =============================================================================

/// Shared staging memory for pushes.
///
/// Used concurrently by every channel of a manager; implementations provide
/// their own synchronization.
pub trait Pushbuffer: Send + Sync {
    /// Reserve space for a new push. May block waiting for space, or fail.
    fn begin_push(&self) -> Result<PushRegion>;

    /// Copy the finished stream into its region and account the bytes used.
    fn end_push(&self, region: &PushRegion, stream: &PushStream) -> StagedRegion;

    /// The GPU is done with `staged`; the bytes may be reused.
    fn mark_completed(&self, staged: StagedRegion);
}
