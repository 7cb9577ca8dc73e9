//! # Diagnostics
//!
//! Read-only views of channel and push state for debug dumps.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write};
use core::panic::Location;

use uvm_core::Result;
use uvm_hal::Gpu;

use crate::channel::Channel;
use crate::channel_type::ChannelType;
use crate::manager::ChannelManager;
use crate::push_info::PushInfoPool;
use crate::ring::GpfifoEntry;

// =============================================================================
// CHANNEL SNAPSHOT
// =============================================================================

/// Point-in-time view of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    /// Channel name
    pub name: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Hardware channel ID
    pub hw_channel_id: u32,
    /// Copy engine index
    pub ce_index: u32,
    /// Cached completed tracking value
    pub completed: u64,
    /// Last queued tracking value
    pub queued: u64,
    /// Ring capacity
    pub gpfifo_count: u32,
    /// Oldest unretired slot
    pub get: u32,
    /// Next slot to write
    pub put: u32,
    /// Claimed but unsubmitted slots
    pub claimed: u32,
}

impl fmt::Display for ChannelSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Channel {}", self.name)?;
        writeln!(f, "completed          {}", self.completed)?;
        writeln!(f, "queued             {}", self.queued)?;
        writeln!(f, "GPFIFO count       {}", self.gpfifo_count)?;
        writeln!(f, "GPFIFO GET         {}", self.get)?;
        writeln!(f, "GPFIFO PUT         {}", self.put)?;
        writeln!(f, "claimed            {}", self.claimed)
    }
}

// =============================================================================
// PUSH RECORD
// =============================================================================

/// A push still tracked by a ring entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    /// Whether the device finished the push
    pub finished: bool,
    /// What the push does
    pub description: String,
    /// Where the push was begun
    pub location: Option<&'static Location<'static>>,
    /// Tracking value released by the push
    pub tracking_value: u64,
}

impl PushRecord {
    pub(crate) fn from_entry(entry: &GpfifoEntry, push_infos: &PushInfoPool, finished: bool) -> Self {
        let info = entry.push_info.and_then(|index| push_infos.peek(index));

        Self {
            finished,
            description: info.map(|i| i.description.clone()).unwrap_or_default(),
            location: info.and_then(|i| i.location),
            tracking_value: entry.tracking_value,
        }
    }
}

impl fmt::Display for PushRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "push '{}'", self.description)?;
        if let Some(location) = self.location {
            write!(f, " started at {}:{}", location.file(), location.line())?;
        }
        write!(f, " releasing value {}", self.tracking_value)
    }
}

// =============================================================================
// CHANNEL DUMPS
// =============================================================================

impl<G: Gpu> Channel<G> {
    /// Snapshot counters and cursors
    pub fn snapshot(&self) -> ChannelSnapshot {
        let state = self.state.lock();

        ChannelSnapshot {
            name: self.name().into(),
            channel_type: self.channel_type(),
            hw_channel_id: self.hw_channel_id(),
            ce_index: self.ce_index(),
            completed: self.tracking().cached_completed_value(),
            queued: self.tracking().queued_value(),
            gpfifo_count: state.ring.capacity(),
            get: state.ring.gpu_get(),
            put: state.ring.cpu_put(),
            claimed: state.ring.current_pushes(),
        }
    }

    /// Pending pushes plus up to `finished_count` retired ones.
    ///
    /// Retired pushes are those slots behind `get` whose entries have not
    /// been overwritten yet, oldest first. The completed value is read fresh,
    /// so pending entries the device already finished are reported finished.
    pub fn pushes(&self, finished_count: u32) -> Vec<PushRecord> {
        let completed = self.update_completed_value();
        let state = self.state.lock();
        let ring = &state.ring;

        let capacity = ring.capacity();
        let unused = capacity - 1 - ring.pending_count();
        let finished = finished_count.min(unused);

        let mut records = Vec::new();
        let start = (ring.gpu_get() + capacity - finished) % capacity;
        for i in 0..finished {
            let entry = ring.entry((start + i) % capacity);
            // Entries never written, or overwritten since
            if entry.tracking_value == 0 || entry.tracking_value > completed {
                continue;
            }
            if entry.tracking_value + u64::from(finished_count) <= completed {
                continue;
            }
            records.push(PushRecord::from_entry(entry, &state.push_infos, true));
        }

        records.extend(ring.pending().map(|entry| {
            PushRecord::from_entry(entry, &state.push_infos, entry.tracking_value <= completed)
        }));

        records
    }

    /// Write the channel snapshot
    pub fn write_info(&self, out: &mut impl Write) -> Result<()> {
        write!(out, "{}", self.snapshot())?;
        Ok(())
    }

    /// Write pending pushes plus up to `finished_count` finished ones
    pub fn write_pushes(&self, out: &mut impl Write, finished_count: u32) -> Result<()> {
        for record in self.pushes(finished_count) {
            let label = if record.finished { "finished" } else { "pending" };
            writeln!(out, " {} {}", label, record)?;
        }
        Ok(())
    }
}

impl<G: Gpu> ChannelManager<G> {
    /// Write every pending push of every channel
    pub fn write_pending_pushes(&self, out: &mut impl Write) -> Result<()> {
        for channel in self.channels() {
            if channel.pending_count() == 0 {
                continue;
            }
            writeln!(out, "Channel {}, pending pushes:", channel.name())?;
            channel.write_pushes(out, 0)?;
        }
        Ok(())
    }
}
