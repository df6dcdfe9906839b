//! # MAGMA Error Handling
//!
//! Error types for the query-result core.
//!
//! Error handling in MAGMA follows these principles:
//! - Errors are typed and categorized
//! - No panics in production code paths
//! - "Not ready" is a normal polling outcome, never an error
//! - Errors are `no_std` compatible

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// MAGMA Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// MAGMA unified error type
///
/// Configuration errors (`NotSupported`, `FeatureNotPresent`,
/// `QueryOffsetOutOfRange`, `OutOfDeviceMemory`) are usually recorded on the
/// object they concern and surfaced at the next host call. Device errors
/// (`DeviceLost`, `InitializationFailed`) short-circuit every host call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Invalid parameter provided
    InvalidParameter,
    /// Operation not supported on this hardware
    NotSupported,
    /// A device feature the operation needs is not enabled
    FeatureNotPresent,

    // =========================================================================
    // Device Errors
    // =========================================================================
    /// The device entered an unrecoverable state
    DeviceLost,
    /// A device object could not be initialized
    InitializationFailed,

    // =========================================================================
    // Memory Errors
    // =========================================================================
    /// Out of device memory
    OutOfDeviceMemory,
    /// Out of host memory
    OutOfHostMemory,
    /// Caller-provided buffer too small for the requested layout
    BufferOverflow,

    // =========================================================================
    // Query Errors
    // =========================================================================
    /// Query slot offset lies past the device's addressable query buffer
    QueryOffsetOutOfRange {
        /// Byte offset of the slot
        offset: u64,
        /// Largest offset the device can address
        max_offset: u64,
    },
    /// Device-wide query budget exhausted
    QueryBudgetExceeded {
        /// Queries the device can still hold
        available: u32,
    },
}

impl Error {
    /// Check if this error means the device can no longer make progress
    pub const fn is_device_failure(&self) -> bool {
        matches!(self, Self::DeviceLost | Self::InitializationFailed)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Generic
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::FeatureNotPresent => write!(f, "device feature not present"),

            // Device
            Self::DeviceLost => write!(f, "device lost"),
            Self::InitializationFailed => write!(f, "initialization failed"),

            // Memory
            Self::OutOfDeviceMemory => write!(f, "out of device memory"),
            Self::OutOfHostMemory => write!(f, "out of host memory"),
            Self::BufferOverflow => write!(f, "buffer overflow"),

            // Query
            Self::QueryOffsetOutOfRange { offset, max_offset } => write!(
                f,
                "query offset {} is larger than the maximum offset {} available on this device",
                offset, max_offset
            ),
            Self::QueryBudgetExceeded { available } => write!(
                f,
                "a maximum of {} total queries are available on this device",
                available
            ),
        }
    }
}

impl core::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_failure_classification() {
        assert!(Error::DeviceLost.is_device_failure());
        assert!(Error::InitializationFailed.is_device_failure());
        assert!(!Error::FeatureNotPresent.is_device_failure());
        assert!(!Error::BufferOverflow.is_device_failure());
    }

    #[test]
    fn test_display_carries_context() {
        use std::string::ToString;

        let msg = Error::QueryOffsetOutOfRange {
            offset: 4096,
            max_offset: 4088,
        }
        .to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("4088"));
    }
}
