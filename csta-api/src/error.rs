use thiserror::Error;

use crate::operation::ValidationError;

/// High-level error type for CSTA operations
///
/// Errors that can occur when building requests for or interpreting
/// responses from the CSTA provider. Transport problems live in the
/// provider client; everything here concerns document content.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The provider answered with a `CSTAErrorCode` document
    #[error("Provider error: {reason}")]
    Provider { category: String, reason: String },

    /// The response matched neither the expected document nor an error document
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The requested monitor type is neither VDN nor SKILL
    #[error("Invalid monitor type: {0}")]
    InvalidMonitorType(String),

    /// Request parameter failed validation before anything was sent
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ApiError {
    /// Whether the provider itself rejected the request.
    pub fn is_provider_error(&self) -> bool {
        matches!(self, ApiError::Provider { .. })
    }

    /// Whether the error was raised before any request reached the provider.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidMonitorType(_) | ApiError::InvalidParameter(_)
        )
    }
}

impl From<ValidationError> for ApiError {
    fn from(validation_error: ValidationError) -> Self {
        match validation_error {
            ValidationError::MissingParameter { parameter } => {
                ApiError::InvalidParameter(format!("Required parameter '{}' is missing", parameter))
            }
            ValidationError::InvalidValue {
                parameter,
                value,
                reason,
            } => ApiError::InvalidParameter(format!(
                "Invalid value '{}' for parameter '{}': {}",
                value, parameter, reason
            )),
        }
    }
}

impl From<quick_xml::DeError> for ApiError {
    fn from(error: quick_xml::DeError) -> Self {
        ApiError::ParseError(error.to_string())
    }
}

/// Type alias for results that may contain an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;
