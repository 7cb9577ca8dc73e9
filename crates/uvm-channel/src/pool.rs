//! # Channel Pool
//!
//! Channels of one type sharing a copy engine. Reserving from the pool
//! claims a slot on whichever member frees up first.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use uvm_core::{Result, SpinLoop};
use uvm_hal::Gpu;

use crate::channel::{Channel, ChannelContext};
use crate::channel_type::ChannelType;

/// Channels of a single type
pub struct ChannelPool<G: Gpu> {
    channel_type: ChannelType,
    channels: Vec<Channel<G>>,
    ctx: Arc<ChannelContext<G>>,
}

impl<G: Gpu> ChannelPool<G> {
    /// Create `count` channels of `channel_type` on copy engine `ce_index`.
    ///
    /// Channels created before a failure are destroyed on the way out.
    pub(crate) fn create(
        ctx: &Arc<ChannelContext<G>>,
        channel_type: ChannelType,
        ce_index: u32,
        count: u32,
    ) -> Result<Self> {
        let mut channels = Vec::new();
        channels.try_reserve_exact(count as usize)?;

        for _ in 0..count {
            channels.push(Channel::create(ctx, channel_type, ce_index)?);
        }

        Ok(Self {
            channel_type,
            channels,
            ctx: ctx.clone(),
        })
    }

    /// Get channel type
    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    /// Get member channels
    pub fn channels(&self) -> &[Channel<G>] {
        &self.channels
    }

    /// Claim a slot on any member, waiting until one frees up.
    ///
    /// A cheap pass tries every channel as is; only then are progress and
    /// errors driven per channel. Only a fatal status ends the wait.
    pub fn reserve(&self) -> Result<&Channel<G>> {
        self.ctx.global.get()?;

        if let Some(channel) = self.channels.iter().find(|channel| channel.try_claim()) {
            return Ok(channel);
        }

        let mut spin = SpinLoop::new(self.ctx.config.spin);
        loop {
            for channel in &self.channels {
                channel.update_progress();
                channel.check_errors()?;

                if channel.try_claim() {
                    return Ok(channel);
                }
            }

            spin.spin()?;
        }
    }

    /// Drive progress on every member and return the total still pending
    pub fn update_progress(&self) -> u32 {
        self.channels.iter().map(|channel| channel.update_progress()).sum()
    }
}

impl<G: Gpu> fmt::Debug for ChannelPool<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPool")
            .field("channel_type", &self.channel_type)
            .field("channels", &self.channels)
            .finish()
    }
}
