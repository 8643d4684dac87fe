//! Error types for the csta-stream crate.

use std::time::Duration;

use correlation_store::StoreError;
use csta_api::ApiError;
use provider_client::ProviderError;

/// Errors that can occur in the protocol engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Writing to or reading from the provider connection failed
    #[error("Provider transport error: {0}")]
    Transport(#[from] ProviderError),

    /// The correlation store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Request rejected by the provider, unexpected response, or invalid input
    #[error("{0}")]
    Protocol(#[from] ApiError),

    /// Publishing or topic management failed
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// No response arrived before the deadline
    #[error("No response to invoke {invoke_id} within {timeout:?}")]
    Timeout { invoke_id: String, timeout: Duration },

    /// The provider connection dropped while waiting for a response
    #[error("Provider connection lost: {0}")]
    ConnectionLost(String),

    /// The wait was cancelled because the engine is shutting down
    #[error("Wait for invoke {0} cancelled by shutdown")]
    Cancelled(String),

    /// No persisted monitor for the extension
    #[error("Extension {0} could not be found")]
    ExtensionNotFound(String),

    /// A persisted extension record could not be decoded
    #[error("Corrupt record for extension {extension}: {reason}")]
    CorruptRecord { extension: String, reason: String },

    /// An operation needs an application session and none is active
    #[error("No active application session")]
    NoSession,

    /// A session is already open
    #[error("An application session is already active")]
    SessionAlreadyActive,

    /// Teardown has started; no new work is accepted
    #[error("Engine is shutting down")]
    ShuttingDown,

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Errors caused by the caller's input, raised before anything was changed.
    pub fn is_validation(&self) -> bool {
        match self {
            EngineError::Protocol(e) => e.is_validation_error(),
            EngineError::ExtensionNotFound(_) => true,
            _ => false,
        }
    }

    /// Errors meaning the provider connection is gone.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            EngineError::ConnectionLost(_) => true,
            EngineError::Transport(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Errors from broker implementations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The topic was never declared
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// The broker connection has been closed
    #[error("Broker connection is closed")]
    Closed,

    /// Any other broker-side failure
    #[error("Broker failure: {0}")]
    Other(String),
}

/// Convenience type alias for Results using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;
