//! # UVM Error Handling
//!
//! Error taxonomy for channel management.
//!
//! Errors fall in two groups:
//! - Construction/allocation failures, fatal to the call that hit them only
//! - Device faults, which are sticky and escalate to the global status

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// UVM Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// UVM unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Allocation Errors
    // =========================================================================
    /// Host memory allocation failed
    OutOfMemory,
    /// The resource manager refused a channel or engine allocation
    HandleAllocationFailed,

    // =========================================================================
    // Device Faults
    // =========================================================================
    /// Generic channel fault reported by the device
    RuntimeFault,
    /// Channel fault refined as an uncorrectable memory error
    MemoryCorrectionFault,

    // =========================================================================
    // Setup Errors
    // =========================================================================
    /// No copy engine can back a channel type
    NoEligibleEngine,
    /// Failed to produce diagnostic output
    DiagnosticSetupFailure,
    /// Invalid parameter provided
    InvalidParameter,
    /// A polling loop hit its configured iteration cap
    Timeout,
}

impl Error {
    /// Device faults escalate to the global fatal status.
    #[inline]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::RuntimeFault | Self::MemoryCorrectionFault)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::HandleAllocationFailed => write!(f, "resource manager handle allocation failed"),
            Self::RuntimeFault => write!(f, "channel runtime fault"),
            Self::MemoryCorrectionFault => write!(f, "uncorrectable ECC error"),
            Self::NoEligibleEngine => write!(f, "no eligible copy engine"),
            Self::DiagnosticSetupFailure => write!(f, "diagnostic output failed"),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::Timeout => write!(f, "spin loop iteration limit reached"),
        }
    }
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::DiagnosticSetupFailure
    }
}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}
