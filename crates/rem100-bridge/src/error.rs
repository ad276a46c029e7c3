//! Error types for the network bridge

use thiserror::Error;

/// Errors that end or interrupt a bridge session
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Command to the appliance failed
    #[error("Device error: {0}")]
    Device(#[from] rem100_core::Error),

    /// The bus master broke the signaling protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Socket I/O failed
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// The peer closed the connection
    #[error("Peer disconnected")]
    PeerDisconnected,

    /// A buffer could not be allocated
    #[error("Out of memory")]
    OutOfMemory,

    /// The flash image does not reach the signaling region
    #[error("Image of {size} bytes is too small, the bridge needs at least {required} bytes")]
    ImageTooSmall {
        /// Image size in bytes
        size: usize,
        /// Minimum size in bytes
        required: usize,
    },

    /// Waiting for a connection was interrupted
    #[error("Interrupted")]
    Interrupted,
}

impl BridgeError {
    /// Whether a failed trace read may be skipped
    ///
    /// A malformed or short trace batch only loses that batch; the decoder
    /// resynchronizes on the next one. Everything else ends the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::Device(
                rem100_core::Error::ShortResponse { .. } | rem100_core::Error::InvalidResponse
            )
        )
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable() {
        let short = BridgeError::from(rem100_core::Error::ShortResponse {
            expected: 8192,
            actual: 12,
        });
        assert!(short.is_recoverable());
        assert!(BridgeError::from(rem100_core::Error::InvalidResponse).is_recoverable());
        assert!(!BridgeError::from(rem100_core::Error::TransportError).is_recoverable());
        assert!(!BridgeError::PeerDisconnected.is_recoverable());
        assert!(!BridgeError::Protocol("bad ack".into()).is_recoverable());
    }
}
