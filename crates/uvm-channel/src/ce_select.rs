//! # Copy Engine Selection
//!
//! Picks one copy engine per channel type when the manager is created.
//!
//! Candidates are ranked by an ordered list of comparator stages. The first
//! stage that tells two engines apart decides:
//!
//! ```text
//! type-specific stages ──▶ less used ──▶ not shared ──▶ lowest index
//! ```
//!
//! Usage counts carry over from one type to the next, so types are always
//! processed in [`ChannelType::SELECTION_ORDER`].

use core::cmp::Ordering;

use uvm_core::{Error, Result};
use uvm_hal::{CopyEngineCaps, COPY_ENGINE_COUNT_MAX};

use crate::channel_type::ChannelType;

// =============================================================================
// COMPARATOR STAGES
// =============================================================================

/// An engine under consideration for a channel type
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    /// Copy engine index
    pub index: u32,
    /// Reported capabilities
    pub caps: CopyEngineCaps,
    /// Types already assigned to this engine
    pub usage: u32,
}

/// One ranking criterion; `Less` means `a` is the better engine
pub type Stage = fn(&Candidate, &Candidate) -> Ordering;

/// Prefer whichever side is `true`
fn prefer(a: bool, b: bool) -> Ordering {
    b.cmp(&a)
}

/// Prefer engines with fast sysmem reads
pub fn prefer_sysmem_read(a: &Candidate, b: &Candidate) -> Ordering {
    prefer(a.caps.sysmem_read(), b.caps.sysmem_read())
}

/// Prefer engines with fast sysmem writes
pub fn prefer_sysmem_write(a: &Candidate, b: &Candidate) -> Ordering {
    prefer(a.caps.sysmem_write(), b.caps.sysmem_write())
}

/// Leave NVLINK peer engines for peer copies
pub fn avoid_nvlink_p2p(a: &Candidate, b: &Candidate) -> Ordering {
    prefer(!a.caps.nvlink_p2p(), !b.caps.nvlink_p2p())
}

/// Prefer engines with NVLINK peer access
pub fn prefer_nvlink_p2p(a: &Candidate, b: &Candidate) -> Ordering {
    prefer(a.caps.nvlink_p2p(), b.caps.nvlink_p2p())
}

/// Among NVLINK engines prefer the one with more physical engines
pub fn prefer_more_pces_on_nvlink(a: &Candidate, b: &Candidate) -> Ordering {
    if a.caps.nvlink_p2p() && b.caps.nvlink_p2p() {
        prefer_more_pces(a, b)
    } else {
        Ordering::Equal
    }
}

/// Prefer engines backed by more physical engines
pub fn prefer_more_pces(a: &Candidate, b: &Candidate) -> Ordering {
    b.caps.pce_count().cmp(&a.caps.pce_count())
}

/// Spread types across engines
pub fn prefer_less_used(a: &Candidate, b: &Candidate) -> Ordering {
    a.usage.cmp(&b.usage)
}

/// Prefer engines that do not share physical engines with others
pub fn avoid_shared(a: &Candidate, b: &Candidate) -> Ordering {
    prefer(!a.caps.shared(), !b.caps.shared())
}

/// Final tie-break
pub fn lowest_index(a: &Candidate, b: &Candidate) -> Ordering {
    a.index.cmp(&b.index)
}

const CPU_TO_GPU_STAGES: [Stage; 2] = [prefer_sysmem_read, avoid_nvlink_p2p];
const GPU_TO_CPU_STAGES: [Stage; 2] = [prefer_sysmem_write, avoid_nvlink_p2p];
const GPU_TO_GPU_STAGES: [Stage; 2] = [prefer_nvlink_p2p, prefer_more_pces_on_nvlink];
const GPU_INTERNAL_STAGES: [Stage; 2] = [prefer_more_pces, avoid_nvlink_p2p];
const COMMON_STAGES: [Stage; 3] = [prefer_less_used, avoid_shared, lowest_index];

/// Type-specific stages, evaluated before the common ones.
///
/// MEMOPS mostly cares about latency, which the common usage stage covers.
pub fn type_stages(channel_type: ChannelType) -> &'static [Stage] {
    match channel_type {
        ChannelType::CpuToGpu => &CPU_TO_GPU_STAGES,
        ChannelType::GpuToCpu => &GPU_TO_CPU_STAGES,
        ChannelType::GpuToGpu => &GPU_TO_GPU_STAGES,
        ChannelType::GpuInternal => &GPU_INTERNAL_STAGES,
        ChannelType::MemOps | ChannelType::Any => &[],
    }
}

/// Compare two candidates for `channel_type`
pub fn compare(channel_type: ChannelType, a: &Candidate, b: &Candidate) -> Ordering {
    type_stages(channel_type)
        .iter()
        .chain(COMMON_STAGES.iter())
        .map(|stage| stage(a, b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Whether an engine can serve `channel_type` at all
pub fn is_usable(channel_type: ChannelType, caps: &CopyEngineCaps) -> bool {
    if !caps.supported() || caps.grce() {
        return false;
    }

    match channel_type {
        ChannelType::CpuToGpu | ChannelType::GpuToCpu => caps.sysmem(),
        ChannelType::GpuToGpu => caps.p2p(),
        ChannelType::GpuInternal | ChannelType::MemOps => true,
        ChannelType::Any => false,
    }
}

// =============================================================================
// ASSIGNMENT
// =============================================================================

/// Copy engine chosen for every pool-backed channel type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineAssignment {
    /// Engine per type, indexed by [`ChannelType::index`]
    ce_by_type: [Option<u32>; ChannelType::POOLS.len()],
    /// Number of types using each engine
    usage_count: [u32; COPY_ENGINE_COUNT_MAX],
}

impl EngineAssignment {
    /// Run selection for every type, without failing on gaps.
    ///
    /// Types with no usable engine stay unassigned; usage counts of types
    /// assigned so far are kept.
    pub fn assign_all(caps: &[CopyEngineCaps; COPY_ENGINE_COUNT_MAX]) -> Self {
        let mut assignment = Self {
            ce_by_type: [None; ChannelType::POOLS.len()],
            usage_count: [0; COPY_ENGINE_COUNT_MAX],
        };

        for channel_type in ChannelType::SELECTION_ORDER {
            if let Some(best) = assignment.pick_for_type(channel_type, caps) {
                assignment.usage_count[best as usize] += 1;
                assignment.ce_by_type[channel_type.index()] = Some(best);
            }
        }

        assignment
    }

    fn pick_for_type(&self, channel_type: ChannelType, caps: &[CopyEngineCaps; COPY_ENGINE_COUNT_MAX]) -> Option<u32> {
        caps.iter()
            .enumerate()
            .filter(|(_, caps)| is_usable(channel_type, caps))
            .map(|(index, caps)| Candidate {
                index: index as u32,
                caps: *caps,
                usage: self.usage_count[index],
            })
            .min_by(|a, b| compare(channel_type, a, b))
            .map(|candidate| candidate.index)
    }

    /// Engine assigned to `channel_type`
    pub fn engine_for_type(&self, channel_type: ChannelType) -> Option<u32> {
        self.ce_by_type.get(channel_type.index()).copied().flatten()
    }

    /// Number of types assigned to engine `ce_index`
    pub fn usage_count(&self, ce_index: u32) -> u32 {
        self.usage_count.get(ce_index as usize).copied().unwrap_or(0)
    }

    /// First type, in pool order, left without an engine
    pub fn first_unassigned(&self) -> Option<ChannelType> {
        ChannelType::POOLS
            .into_iter()
            .find(|channel_type| self.engine_for_type(*channel_type).is_none())
    }
}

/// Pick an engine for every channel type.
///
/// Fails with [`Error::NoEligibleEngine`] if any type has no usable engine.
pub fn pick_copy_engines(caps: &[CopyEngineCaps; COPY_ENGINE_COUNT_MAX], gpu_name: &str) -> Result<EngineAssignment> {
    let assignment = EngineAssignment::assign_all(caps);

    if let Some(channel_type) = assignment.first_unassigned() {
        log::error!("Failed to find a suitable CE for channel type {}, GPU {}", channel_type, gpu_name);
        return Err(Error::NoEligibleEngine);
    }

    for channel_type in ChannelType::POOLS {
        if let Some(ce) = assignment.engine_for_type(channel_type) {
            log::debug!("Channel type {} uses CE {}, GPU {}", channel_type, ce, gpu_name);
        }
    }

    Ok(assignment)
}
