//! # Copy Engine Capabilities
//!
//! Per-CE capability table reported by the resource manager.

/// Maximum number of copy engines on a GPU
pub const COPY_ENGINE_COUNT_MAX: usize = 9;

bitflags::bitflags! {
    /// Copy engine capability bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CeCapFlags: u32 {
        /// The CE exists and can be used
        const SUPPORTED = 1 << 0;
        /// Reserved for the graphics engine (GRCE)
        const GRCE = 1 << 1;
        /// Shares physical CEs with other logical CEs
        const SHARED = 1 << 2;
        /// Can access system memory
        const SYSMEM = 1 << 3;
        /// Fast system memory reads
        const SYSMEM_READ = 1 << 4;
        /// Fast system memory writes
        const SYSMEM_WRITE = 1 << 5;
        /// Can do peer-to-peer copies
        const P2P = 1 << 6;
        /// Peer-to-peer over NVLINK
        const NVLINK_P2P = 1 << 7;
    }
}

/// Capabilities of one logical copy engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CopyEngineCaps {
    /// Capability bits
    pub flags: CeCapFlags,
    /// Mask of physical CEs backing this logical CE
    pub pce_mask: u32,
}

impl CopyEngineCaps {
    /// An absent copy engine
    pub const fn unsupported() -> Self {
        Self {
            flags: CeCapFlags::empty(),
            pce_mask: 0,
        }
    }

    /// Create caps from flags and PCE mask
    pub const fn new(flags: CeCapFlags, pce_mask: u32) -> Self {
        Self { flags, pce_mask }
    }

    /// Check if the CE can be used
    #[inline]
    pub fn supported(&self) -> bool {
        self.flags.contains(CeCapFlags::SUPPORTED)
    }

    /// Check if reserved for graphics
    #[inline]
    pub fn grce(&self) -> bool {
        self.flags.contains(CeCapFlags::GRCE)
    }

    /// Check if physical CEs are shared
    #[inline]
    pub fn shared(&self) -> bool {
        self.flags.contains(CeCapFlags::SHARED)
    }

    /// Check system memory access
    #[inline]
    pub fn sysmem(&self) -> bool {
        self.flags.contains(CeCapFlags::SYSMEM)
    }

    /// Check fast system memory reads
    #[inline]
    pub fn sysmem_read(&self) -> bool {
        self.flags.contains(CeCapFlags::SYSMEM_READ)
    }

    /// Check fast system memory writes
    #[inline]
    pub fn sysmem_write(&self) -> bool {
        self.flags.contains(CeCapFlags::SYSMEM_WRITE)
    }

    /// Check peer-to-peer support
    #[inline]
    pub fn p2p(&self) -> bool {
        self.flags.contains(CeCapFlags::P2P)
    }

    /// Check NVLINK peer-to-peer support
    #[inline]
    pub fn nvlink_p2p(&self) -> bool {
        self.flags.contains(CeCapFlags::NVLINK_P2P)
    }

    /// Number of physical CEs backing this logical CE
    #[inline]
    pub fn pce_count(&self) -> u32 {
        self.pce_mask.count_ones()
    }
}
