//! # Channel Types
//!
//! Functional channel categories, each served by its own pool.

use core::fmt;

/// Functional type of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ChannelType {
    /// CPU to GPU copies
    CpuToGpu = 0,
    /// GPU to CPU copies
    GpuToCpu = 1,
    /// Copies within the GPU's own memory
    GpuInternal = 2,
    /// Memsets and other memory operations
    MemOps = 3,
    /// Peer-to-peer copies
    GpuToGpu = 4,
    /// Wildcard, never backed by a pool
    Any = 5,
}

impl ChannelType {
    /// Number of types including `Any`
    pub const COUNT: usize = 6;

    /// Types that own a pool, in pool creation order
    pub const POOLS: [ChannelType; 5] = [
        Self::CpuToGpu,
        Self::GpuToCpu,
        Self::GpuInternal,
        Self::MemOps,
        Self::GpuToGpu,
    ];

    /// Order in which copy engines are picked.
    ///
    /// Usage counts accumulate across types, so the result depends on this
    /// order. MEMOPS goes last as it only cares about low CE usage.
    pub const SELECTION_ORDER: [ChannelType; 5] = [
        Self::CpuToGpu,
        Self::GpuToCpu,
        Self::GpuInternal,
        Self::GpuToGpu,
        Self::MemOps,
    ];

    /// Dense index, usable for per-type arrays
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Upper-case name used in logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CpuToGpu => "CPU_TO_GPU",
            Self::GpuToCpu => "GPU_TO_CPU",
            Self::GpuInternal => "GPU_INTERNAL",
            Self::MemOps => "MEMOPS",
            Self::GpuToGpu => "GPU_TO_GPU",
            Self::Any => "ANY",
        }
    }
}

static_assertions::const_assert_eq!(ChannelType::POOLS.len(), ChannelType::Any as usize);
static_assertions::const_assert_eq!(ChannelType::COUNT, ChannelType::Any as usize + 1);

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
