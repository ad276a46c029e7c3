//! Error types for the USB transport

use thiserror::Error;

/// Errors raised while finding and opening an appliance
#[derive(Debug, Error)]
pub enum UsbError {
    /// No matching appliance is attached
    #[error("EM100Pro not found (VID:04B4 PID:1235)")]
    DeviceNotFound,

    /// No appliance carries the requested serial number
    #[error("Could not find EM100Pro with serial number {0}")]
    SerialNotFound(String),

    /// The device could not be opened
    #[error("Failed to open EM100Pro: {0}")]
    OpenFailed(String),

    /// Interface 0 could not be claimed
    #[error("Failed to claim interface: {0}")]
    ClaimFailed(String),

    /// The device selector could not be parsed
    #[error("Invalid device selector '{0}', expected N, bus:address or DPnnnnnn")]
    InvalidSelector(String),

    /// Error from the command layer
    #[error("{0}")]
    Core(#[from] rem100_core::Error),
}

/// Result type for USB operations
pub type Result<T> = std::result::Result<T, UsbError>;
