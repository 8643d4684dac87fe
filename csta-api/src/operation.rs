//! Operation framework
//!
//! Every CSTA request the bridge issues is described by a type implementing
//! [`CstaOperation`]: how to render its XML document and how to read the
//! provider's answer back into a typed response.

use crate::error::Result;

/// Validation error types
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Required parameter '{parameter}' is missing")]
    MissingParameter { parameter: String },

    #[error("Parameter '{parameter}' value '{value}' is invalid: {reason}")]
    InvalidValue {
        parameter: String,
        value: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn missing(parameter: &str) -> Self {
        Self::MissingParameter {
            parameter: parameter.to_string(),
        }
    }

    pub fn invalid_value(parameter: &str, value: impl std::fmt::Display, reason: &str) -> Self {
        Self::InvalidValue {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Trait for request types that can be validated before they are sent
pub trait Validate {
    /// Light validation at the API boundary: required identifiers present,
    /// no obviously malformed values.
    fn validate_boundary(&self) -> std::result::Result<(), ValidationError> {
        Ok(())
    }
}

/// Reject an empty (or whitespace-only) required identifier.
pub fn require(parameter: &str, value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::missing(parameter))
    } else {
        Ok(())
    }
}

/// A single CSTA request/response exchange.
pub trait CstaOperation {
    /// The request data needed to render the document
    type Request: Validate;

    /// The typed response
    type Response;

    /// Request document name, used in logs and InvokeRecords
    const ACTION: &'static str;

    /// Root element of a successful response document
    const EXPECTED_ROOT: &'static str;

    /// Whether the provider may take unusually long to acknowledge.
    ///
    /// Long-running operations get a non-expiring InvokeRecord and the
    /// long-running wait deadline.
    const LONG_RUNNING: bool = false;

    /// Validate the request and render the XML document.
    fn build_payload(request: &Self::Request) -> Result<String>;

    /// Parse the raw response document.
    fn parse_response(xml: &str) -> Result<Self::Response>;
}
