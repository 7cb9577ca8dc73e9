//! # Channel Manager
//!
//! Owns every channel pool of a GPU, the shared pushbuffer and the copy
//! engine assignment.
//!
//! ## Lifecycle
//!
//! ```text
//!  create()
//!    │  pushbuffer ─▶ pick engines ─▶ pools/channels ─▶ init push per channel
//!    │        (any failure unwinds what was built and returns the error)
//!    ▼
//!  Ready ── reserve / push / progress / check_errors ──┐
//!    │                                                 │
//!    ▼ drop                                            │
//!  channels force-drained and destroyed, pushbuffer last
//! ```
//!
//! The manager itself holds no lock. Aggregate operations visit channels one
//! at a time, so their results are point-in-time snapshots.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::panic::Location;

use uvm_core::{Error, GlobalStatus, Result, SpinConfig, SpinLoop};
use uvm_hal::{CeHal, Gpu, HostHal};

use crate::ce_select::{pick_copy_engines, EngineAssignment};
use crate::channel::{Channel, ChannelContext};
use crate::channel_type::ChannelType;
use crate::pool::ChannelPool;
use crate::push::Push;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Channel manager configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Channels created per pool
    pub channels_per_pool: u32,
    /// Entries retired per progress call on hot paths
    pub progress_budget: u32,
    /// Backoff for every wait loop
    pub spin: SpinConfig,
}

impl ManagerConfig {
    /// Default channels per pool
    pub const DEFAULT_CHANNELS_PER_POOL: u32 = 2;

    /// Default progress budget
    pub const DEFAULT_PROGRESS_BUDGET: u32 = 8;

    /// Create the default configuration
    pub const fn new() -> Self {
        Self {
            channels_per_pool: Self::DEFAULT_CHANNELS_PER_POOL,
            progress_budget: Self::DEFAULT_PROGRESS_BUDGET,
            spin: SpinConfig::unbounded(),
        }
    }

    /// Set channels per pool
    pub const fn with_channels_per_pool(mut self, count: u32) -> Self {
        self.channels_per_pool = count;
        self
    }

    /// Set progress budget
    pub const fn with_progress_budget(mut self, budget: u32) -> Self {
        self.progress_budget = budget;
        self
    }

    /// Set wait loop backoff
    pub const fn with_spin(mut self, spin: SpinConfig) -> Self {
        self.spin = spin;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.channels_per_pool == 0 || self.progress_budget == 0 {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// CHANNEL MANAGER
// =============================================================================

/// All channels of one GPU
pub struct ChannelManager<G: Gpu> {
    /// Declared first so channels drop before the shared context
    pools: Vec<ChannelPool<G>>,
    engines: EngineAssignment,
    ctx: Arc<ChannelContext<G>>,
}

impl<G: Gpu> ChannelManager<G> {
    /// Bring up every channel of `gpu`.
    ///
    /// Every channel runs one init push and waits for it before this
    /// returns. On failure everything created so far is torn down.
    pub fn create(gpu: Arc<G>, global: Arc<GlobalStatus>, config: ManagerConfig) -> Result<Self> {
        config.validate()?;

        let pushbuffer = gpu.pushbuffer_create().map_err(|err| {
            log::error!("Failed to create pushbuffer: {}, GPU {}", err, gpu.name());
            err
        })?;

        let engines = pick_copy_engines(gpu.ce_caps(), gpu.name())?;

        let mut pools = Vec::new();
        pools.try_reserve_exact(ChannelType::POOLS.len())?;

        let mut manager = Self {
            pools,
            engines,
            ctx: Arc::new(ChannelContext {
                gpu,
                pushbuffer,
                global,
                config,
            }),
        };

        for channel_type in ChannelType::POOLS {
            let ce_index = engines.engine_for_type(channel_type).ok_or(Error::NoEligibleEngine)?;
            let pool = ChannelPool::create(&manager.ctx, channel_type, ce_index, config.channels_per_pool)?;
            manager.pools.push(pool);
        }

        manager.init_channels()?;

        log::info!(
            "Channel manager ready: {} channels, GPU {}",
            manager.channels().count(),
            manager.ctx.gpu.name()
        );

        Ok(manager)
    }

    fn init_channels(&self) -> Result<()> {
        let gpu = &self.ctx.gpu;

        for channel in self.channels() {
            let mut push = Push::begin_on_channel(channel, "Init channel").map_err(|err| {
                log::error!("Failed to begin push on channel {}: {}, GPU {}", channel.name(), err, gpu.name());
                err
            })?;

            gpu.ce_hal().init(push.stream_mut());
            gpu.host_hal().init(push.stream_mut());

            push.end_and_wait().map_err(|err| {
                log::error!("Channel init failed: {}, channel {}, GPU {}", err, channel.name(), gpu.name());
                err
            })?;
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Get the GPU
    pub fn gpu(&self) -> &Arc<G> {
        &self.ctx.gpu
    }

    /// Get the shared pushbuffer
    pub fn pushbuffer(&self) -> &G::Pushbuffer {
        &self.ctx.pushbuffer
    }

    /// Get the global fatal status
    pub fn global(&self) -> &Arc<GlobalStatus> {
        &self.ctx.global
    }

    /// Get the configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.ctx.config
    }

    /// Get the engine assignment
    pub fn engines(&self) -> &EngineAssignment {
        &self.engines
    }

    /// Copy engine used by channels of `channel_type`
    pub fn engine_for_type(&self, channel_type: ChannelType) -> Option<u32> {
        self.engines.engine_for_type(channel_type)
    }

    /// Pool serving `channel_type`
    pub fn pool(&self, channel_type: ChannelType) -> Option<&ChannelPool<G>> {
        self.pools.iter().find(|pool| pool.channel_type() == channel_type)
    }

    /// Every channel, pool by pool
    pub fn channels(&self) -> impl Iterator<Item = &Channel<G>> + '_ {
        self.pools.iter().flat_map(|pool| pool.channels())
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Claim a slot on some channel of `channel_type`
    pub fn reserve_type(&self, channel_type: ChannelType) -> Result<&Channel<G>> {
        self.pool(channel_type).ok_or(Error::InvalidParameter)?.reserve()
    }

    /// Reserve a channel of `channel_type` and begin a push on it
    #[track_caller]
    pub fn push_begin(&self, channel_type: ChannelType, description: impl Into<String>) -> Result<Push<'_, G>> {
        let location = Location::caller();
        let channel = self.reserve_type(channel_type)?;
        Push::begin_reserved(channel, description.into(), location)
    }

    /// Drive progress on every channel and return the total still pending
    pub fn update_progress(&self) -> u32 {
        self.pools.iter().map(|pool| pool.update_progress()).sum()
    }

    /// Global status first, then every channel; the first failure wins
    pub fn check_errors(&self) -> Result<()> {
        self.ctx.global.get()?;
        self.channels().try_for_each(|channel| channel.check_errors())
    }

    /// Wait until nothing is pending on any channel
    pub fn wait(&self) -> Result<()> {
        if self.update_progress() == 0 {
            return self.check_errors();
        }

        let mut spin = SpinLoop::new(self.ctx.config.spin);
        while self.update_progress() > 0 {
            spin.spin()?;
            self.check_errors()?;
        }

        Ok(())
    }

    /// First channel with a free slot, without claiming it
    pub fn find_available_channel(&self) -> Option<&Channel<G>> {
        self.channels().find(|channel| channel.is_available())
    }
}

impl<G: Gpu> fmt::Debug for ChannelManager<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("gpu", &self.ctx.gpu.name())
            .field("engines", &self.engines)
            .field("pools", &self.pools)
            .finish()
    }
}

impl<G: Gpu> Drop for ChannelManager<G> {
    fn drop(&mut self) {
        // Pools go first; the pushbuffer goes with the last context reference
        self.pools.clear();
        log::debug!("Channel manager destroyed, GPU {}", self.ctx.gpu.name());
    }
}
