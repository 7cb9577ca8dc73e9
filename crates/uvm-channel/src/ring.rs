//! # GPFIFO Ring
//!
//! CPU-side bookkeeping for a channel's GPFIFO.
//!
//! ```text
//!            gpu_get                 cpu_put    claimed
//!               │                       │      ┌──┴──┐
//!   ┌────┬────┬─▼──┬────┬────┬────┬────┬▼───┬──▼─┬───▼┬────┐
//!   │    │    │ E0 │ E1 │ E2 │ E3 │ E4 │ c  │ c  │    │    │
//!   └────┴────┴────┴────┴────┴────┴────┴────┴────┴────┴────┘
//!               └──── pending (submitted) ─┘
//! ```
//!
//! `cpu_put` is the next slot to write, `gpu_get` the oldest unretired one.
//! One slot always stays empty so that `cpu_put == gpu_get` means empty, so
//! at most `capacity - 1` slots are pending or claimed at any time.

use alloc::vec::Vec;

use uvm_core::{Error, Result};
use uvm_hal::StagedRegion;

// =============================================================================
// RING ENTRY
// =============================================================================

/// A submitted entry in the ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpfifoEntry {
    /// Tracking value released when the push completes
    pub tracking_value: u64,
    /// Pushbuffer bytes used by the push
    pub staged: StagedRegion,
    /// Push info slot bound to this entry
    pub push_info: Option<u32>,
}

/// How far a progress update may retire entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Only retire entries whose tracking value completed
    Completed,
    /// Retire everything regardless of completion
    ForceAll,
}

// =============================================================================
// RING
// =============================================================================

/// Fixed-capacity GPFIFO bookkeeping
#[derive(Debug)]
pub struct GpfifoRing {
    /// Entry shadow, one per hardware slot
    entries: Vec<GpfifoEntry>,
    /// Next slot to write
    cpu_put: u32,
    /// Oldest unretired slot
    gpu_get: u32,
    /// Slots claimed by reservations not yet submitted
    current_pushes: u32,
}

impl GpfifoRing {
    /// Create an empty ring with `capacity` slots
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity < 2 {
            return Err(Error::InvalidParameter);
        }

        let mut entries = Vec::new();
        entries.try_reserve_exact(capacity as usize)?;
        entries.resize(capacity as usize, GpfifoEntry::default());

        Ok(Self {
            entries,
            cpu_put: 0,
            gpu_get: 0,
            current_pushes: 0,
        })
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Next slot to write
    #[inline]
    pub fn cpu_put(&self) -> u32 {
        self.cpu_put
    }

    /// Oldest unretired slot
    #[inline]
    pub fn gpu_get(&self) -> u32 {
        self.gpu_get
    }

    /// Claimed but not yet submitted slots
    #[inline]
    pub fn current_pushes(&self) -> u32 {
        self.current_pushes
    }

    #[inline]
    fn next(&self, index: u32) -> u32 {
        (index + 1) % self.capacity()
    }

    /// Submitted but not yet retired entries
    pub fn pending_count(&self) -> u32 {
        if self.cpu_put >= self.gpu_get {
            self.cpu_put - self.gpu_get
        } else {
            self.capacity() - self.gpu_get + self.cpu_put
        }
    }

    /// Whether one more slot can be claimed
    pub fn is_available(&self) -> bool {
        let next_put = (self.cpu_put + self.current_pushes + 1) % self.capacity();
        next_put != self.gpu_get
    }

    /// Claim a slot for an upcoming push
    pub fn try_claim(&mut self) -> bool {
        if !self.is_available() {
            return false;
        }
        self.current_pushes += 1;
        true
    }

    /// Give back a claim that will never be submitted
    pub fn release_claim(&mut self) {
        assert!(self.current_pushes > 0, "releasing a claim that was never made");
        self.current_pushes -= 1;
    }

    /// Write `entry` at `cpu_put` and advance it, consuming one claim.
    ///
    /// Returns the slot written and the new put index.
    pub fn submit(&mut self, entry: GpfifoEntry) -> (u32, u32) {
        assert!(self.current_pushes > 0, "submitting without a claimed slot");
        debug_assert!(self.pending_count() + 1 < self.capacity());

        let index = self.cpu_put;
        if let Some(last) = self.last_submitted() {
            debug_assert!(entry.tracking_value > last.tracking_value);
        }

        self.entries[index as usize] = entry;
        self.cpu_put = self.next(index);
        self.current_pushes -= 1;

        (index, self.cpu_put)
    }

    fn last_submitted(&self) -> Option<&GpfifoEntry> {
        if self.cpu_put == self.gpu_get {
            return None;
        }
        let last = (self.cpu_put + self.capacity() - 1) % self.capacity();
        Some(&self.entries[last as usize])
    }

    /// Raw slot contents, including retired entries not yet overwritten
    pub(crate) fn entry(&self, index: u32) -> &GpfifoEntry {
        &self.entries[index as usize]
    }

    /// Oldest pending entry
    pub fn first_pending(&self) -> Option<&GpfifoEntry> {
        if self.cpu_put == self.gpu_get {
            None
        } else {
            Some(&self.entries[self.gpu_get as usize])
        }
    }

    /// Pending entries, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &GpfifoEntry> + '_ {
        let capacity = self.capacity();
        let get = self.gpu_get;
        (0..self.pending_count()).map(move |i| &self.entries[((get + i) % capacity) as usize])
    }

    /// Retire up to `max` entries in submission order.
    ///
    /// In [`UpdateMode::Completed`] this stops at the first entry whose
    /// tracking value is above `completed_value`; later entries cannot have
    /// completed either. `on_retire` sees every retired entry.
    ///
    /// Returns the number of entries still pending.
    pub fn retire(
        &mut self,
        max: u32,
        mode: UpdateMode,
        completed_value: u64,
        mut on_retire: impl FnMut(&GpfifoEntry),
    ) -> u32 {
        let mut retired = 0;

        while self.gpu_get != self.cpu_put && retired < max {
            let entry = &self.entries[self.gpu_get as usize];

            if mode == UpdateMode::Completed && entry.tracking_value > completed_value {
                break;
            }

            on_retire(entry);
            self.gpu_get = self.next(self.gpu_get);
            retired += 1;
        }

        self.pending_count()
    }
}
