//! Typed CSTA documents for the provider protocol
//!
//! This crate knows how to render every request document the bridge sends
//! and how to interpret the provider's answers:
//!
//! - [`CstaOperation`]: one request/response exchange, with its expected
//!   response root element
//! - [`operations`]: session, device and monitor operations
//! - [`CstaErrorCode`]: the provider's structured error document, surfaced
//!   as [`ApiError::Provider`]
//! - [`event`]: XML to JSON conversion and flattening of unsolicited events
//!
//! # Example
//!
//! ```rust
//! use csta_api::operations::{MonitorStart, MonitorStartRequest};
//! use csta_api::{CstaOperation, MonitorType};
//!
//! let payload = MonitorStart::build_payload(&MonitorStartRequest {
//!     device_id: "N<1001>".to_string(),
//!     monitor_type: "vdn".parse::<MonitorType>().unwrap(),
//! })
//! .unwrap();
//! assert!(payload.contains("<monitorType>call</monitorType>"));
//!
//! let response = MonitorStart::parse_response(
//!     "<MonitorStartResponse><monitorCrossRefID>42</monitorCrossRefID></MonitorStartResponse>",
//! )
//! .unwrap();
//! assert_eq!(response.monitor_cross_ref_id, "42");
//! ```

pub mod error;
pub mod error_code;
pub mod event;
pub mod operation;
pub mod operations;
pub mod types;
pub mod xml_utils;

pub use error::{ApiError, Result};
pub use error_code::CstaErrorCode;
pub use operation::{CstaOperation, Validate, ValidationError};
pub use types::MonitorType;
