//! # Push Info Slots
//!
//! Per-channel arena of push metadata: what the push was for, where it was
//! started, and what to run once it retires. One slot per ring entry, handed
//! out from a free queue.
//!
//! Released slots go to the back of the queue, so a retired push keeps its
//! description for as long as possible for diagnostics.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::panic::Location;

use uvm_core::Result;

/// Callback run once when a push's ring entry retires
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

// =============================================================================
// PUSH INFO
// =============================================================================

/// Metadata bound to one in-flight push
#[derive(Default)]
pub struct PushInfo {
    /// What the push does
    pub description: String,
    /// Where the push was begun
    pub location: Option<&'static Location<'static>>,
    /// Run when the entry retires, normally or by force
    pub on_complete: Option<CompletionCallback>,
}

impl PushInfo {
    /// Create push info without a completion callback
    pub fn new(description: impl Into<String>, location: &'static Location<'static>) -> Self {
        Self {
            description: description.into(),
            location: Some(location),
            on_complete: None,
        }
    }
}

impl fmt::Debug for PushInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushInfo")
            .field("description", &self.description)
            .field("location", &self.location)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

// =============================================================================
// SLOT POOL
// =============================================================================

/// Fixed pool of push info slots
#[derive(Debug)]
pub struct PushInfoPool {
    /// Slot storage
    infos: Vec<PushInfo>,
    /// Free slot indices, oldest release first
    free_list: VecDeque<u32>,
    /// Whether each slot is bound to a push
    bound: Vec<bool>,
}

impl PushInfoPool {
    /// Create a pool of `count` free slots
    pub fn new(count: u32) -> Result<Self> {
        let mut infos = Vec::new();
        infos.try_reserve_exact(count as usize)?;
        infos.resize_with(count as usize, PushInfo::default);

        let mut free_list = VecDeque::new();
        free_list.try_reserve_exact(count as usize)?;
        free_list.extend(0..count);

        let mut bound = Vec::new();
        bound.try_reserve_exact(count as usize)?;
        bound.resize(count as usize, false);

        Ok(Self {
            infos,
            free_list,
            bound,
        })
    }

    /// Total number of slots
    pub fn capacity(&self) -> u32 {
        self.infos.len() as u32
    }

    /// Number of free slots
    pub fn available(&self) -> u32 {
        self.free_list.len() as u32
    }

    /// Bind `info` to a free slot
    pub fn acquire(&mut self, info: PushInfo) -> Option<u32> {
        let index = self.free_list.pop_front()?;

        debug_assert!(!self.bound[index as usize]);
        self.bound[index as usize] = true;
        self.infos[index as usize] = info;

        Some(index)
    }

    /// Return a slot to the free list, handing back its completion callback
    pub fn release(&mut self, index: u32) -> Option<CompletionCallback> {
        let slot = index as usize;
        assert!(self.bound[slot], "push info slot {} released twice", index);

        self.bound[slot] = false;
        self.free_list.push_back(index);

        // Description and location stay until reuse for diagnostics
        self.infos[slot].on_complete.take()
    }

    /// Bound slot contents
    pub fn get(&self, index: u32) -> Option<&PushInfo> {
        let slot = index as usize;
        if *self.bound.get(slot)? {
            Some(&self.infos[slot])
        } else {
            None
        }
    }

    /// Last known contents of a slot, bound or not
    pub(crate) fn peek(&self, index: u32) -> Option<&PushInfo> {
        self.infos.get(index as usize)
    }

    /// Attach a completion callback to a bound slot
    pub fn set_on_complete(&mut self, index: u32, callback: CompletionCallback) {
        assert!(self.bound[index as usize], "push info slot {} is not bound", index);
        self.infos[index as usize].on_complete = Some(callback);
    }
}
