//! Error types for the provider client

use thiserror::Error;

/// Errors that can occur while talking to the CSTA provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Socket level read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider closed the stream (or it ended mid-frame)
    #[error("Connection closed by provider")]
    ConnectionClosed,

    /// Could not establish the TCP connection
    #[error("Failed to connect to provider {host}: {reason}")]
    Connect { host: String, reason: String },

    /// Declared frame length is shorter than the header itself
    #[error("Invalid frame length {0} (must be at least 8)")]
    InvalidLength(u16),

    /// Payload does not fit in the 16-bit length field
    #[error("Frame too large: payload of {0} bytes exceeds the 16-bit length field")]
    FrameTooLarge(usize),

    /// Invoke id header field is not four ASCII digits
    #[error("Invalid invoke id: {0:?}")]
    InvalidInvokeId(String),

    /// Payload bytes are not valid UTF-8
    #[error("Invalid frame payload: {0}")]
    InvalidPayload(String),

    /// Connection was closed locally
    #[error("Connection is not open")]
    NotConnected,
}

impl ProviderError {
    /// Whether the error leaves the inbound stream unusable.
    ///
    /// Per-frame errors consume exactly one frame's bytes, so the reader can
    /// carry on with the next frame. Everything else desynchronises the stream.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProviderError::InvalidInvokeId(_) | ProviderError::InvalidPayload(_)
        )
    }
}

/// Type alias for results that can return a ProviderError
pub type Result<T> = std::result::Result<T, ProviderError>;
