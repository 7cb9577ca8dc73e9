//! # Global Fatal Status
//!
//! Sticky, set-once fatal status shared by every channel of a device.
//!
//! Once a channel fault is detected the status is latched and from then on
//! every health check returns it without touching hardware again. Waiters
//! poll it every iteration, which makes it the only cancellation signal.

use spin::Once;

use crate::error::{Error, Result};

/// Set-once fatal status cell
#[derive(Debug)]
pub struct GlobalStatus {
    fatal: Once<Error>,
}

impl GlobalStatus {
    /// Create a healthy status
    pub const fn new() -> Self {
        Self { fatal: Once::new() }
    }

    /// Current status, `Ok(())` while healthy
    #[inline]
    pub fn get(&self) -> Result<()> {
        match self.fatal.get() {
            Some(error) => Err(*error),
            None => Ok(()),
        }
    }

    /// Check if a fatal error has been latched
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_completed()
    }

    /// Latch a fatal error.
    ///
    /// The first error wins; later calls return the already latched one.
    /// Only device faults may be latched.
    pub fn set_fatal(&self, error: Error) -> Error {
        debug_assert!(error.is_fatal(), "latching a non-fatal error: {}", error);

        let mut won = false;
        let latched = *self.fatal.call_once(|| {
            won = true;
            error
        });
        if won {
            log::error!("Fatal error latched: {}", latched);
        }
        latched
    }
}

impl Default for GlobalStatus {
    fn default() -> Self {
        Self::new()
    }
}
