//! # Backoff Polling
//!
//! Bounded-backoff spin loop used by every waiter in the channel stack.
//!
//! A waiter calls [`SpinLoop::spin`] once per failed poll. Each call burns an
//! exponentially growing number of `spin_loop` hints up to a ceiling, then
//! (with `std`) yields the thread. There is no timeout in production: the
//! only ways out of a wait are success or a fatal status observed by the
//! caller. Tests may inject an iteration cap to keep a broken wait finite.

use crate::error::{Error, Result};

/// Upper bound of the exponential backoff, in `spin_loop` hints
const MAX_BACKOFF_SHIFT: u32 = 10;

// =============================================================================
// SPIN CONFIGURATION
// =============================================================================

/// Spin loop configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinConfig {
    /// Iterations after which a single warning is logged
    pub warn_after: u64,
    /// Hard cap on iterations, `None` to poll forever
    pub max_iterations: Option<u64>,
}

impl SpinConfig {
    /// Production configuration: warn eventually, never give up
    pub const fn unbounded() -> Self {
        Self {
            warn_after: 1 << 20,
            max_iterations: None,
        }
    }

    /// Configuration that fails with [`Error::Timeout`] after `max` polls
    pub const fn capped(max: u64) -> Self {
        Self {
            warn_after: 1 << 20,
            max_iterations: Some(max),
        }
    }
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

// =============================================================================
// SPIN LOOP
// =============================================================================

/// Per-wait backoff state
#[derive(Debug)]
pub struct SpinLoop {
    config: SpinConfig,
    iterations: u64,
    warned: bool,
}

impl SpinLoop {
    /// Start a new wait
    pub const fn new(config: SpinConfig) -> Self {
        Self {
            config,
            iterations: 0,
            warned: false,
        }
    }

    /// Number of completed backoff iterations
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Back off once.
    ///
    /// Fails only when an iteration cap is configured and reached.
    pub fn spin(&mut self) -> Result<()> {
        if let Some(max) = self.config.max_iterations {
            if self.iterations >= max {
                return Err(Error::Timeout);
            }
        }

        let shift = self.iterations.min(u64::from(MAX_BACKOFF_SHIFT)) as u32;
        for _ in 0..(1u32 << shift) {
            core::hint::spin_loop();
        }

        #[cfg(feature = "std")]
        if shift == MAX_BACKOFF_SHIFT {
            std::thread::yield_now();
        }

        self.iterations += 1;

        if !self.warned && self.iterations >= self.config.warn_after {
            self.warned = true;
            log::warn!("Still spinning after {} iterations", self.iterations);
        }

        Ok(())
    }
}
