use thiserror::Error;

/// Errors returned by a [`CorrelationStore`](crate::CorrelationStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has been closed; no further calls are served
    #[error("Store connection is closed")]
    Closed,

    /// The operation does not apply to the value held at the key
    #[error("Operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },

    /// The backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn wrong_type(key: &str) -> Self {
        Self::WrongType {
            key: key.to_string(),
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
