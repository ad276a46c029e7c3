//! Error types for rem100-core
//!
//! This module provides a no_std compatible error type shared by the
//! decoder, the write queue and the device command set.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Transport errors
    /// A command frame or data block was not accepted by the device
    TransportError,
    /// The device answered with fewer bytes than the command requires
    ShortResponse {
        /// Number of bytes the command expects
        expected: usize,
        /// Number of bytes actually received
        actual: usize,
    },
    /// The device answered with a malformed response
    InvalidResponse,
    /// The device did not answer in time
    Timeout,

    // Protocol errors
    /// A write request broke the signaling protocol with the bus master
    ProtocolViolation,
    /// An offset or length lies outside the emulated memory window
    AddressOutOfBounds,

    // Resource errors
    /// A buffer could not be allocated
    OutOfMemory,
    /// A caller supplied an argument the device cannot accept
    InvalidArgument,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportError => write!(f, "device transfer failed"),
            Self::ShortResponse { expected, actual } => {
                write!(
                    f,
                    "short response from device: got {} bytes instead of {}",
                    actual, expected
                )
            }
            Self::InvalidResponse => write!(f, "invalid response from device"),
            Self::Timeout => write!(f, "device operation timed out"),
            Self::ProtocolViolation => write!(f, "bridge protocol violation"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
