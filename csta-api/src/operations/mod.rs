//! CSTA operations issued by the bridge
//!
//! Application-session operations use the ECMA-354 namespace, call-control
//! operations the ECMA-323 (ed3) namespace, and device resolution the
//! provider's private schema.

pub mod device;
pub mod monitor;
pub mod session;

pub use device::{Device, GetDeviceId, GetDeviceIdRequest, GetDeviceIdResponse};
pub use monitor::{
    MonitorStart, MonitorStartRequest, MonitorStartResponse, MonitorStop, MonitorStopRequest,
};
pub use session::{
    ResetApplicationSessionTimer, ResetApplicationSessionTimerRequest,
    ResetApplicationSessionTimerResponse, StartApplicationSession, StartApplicationSessionRequest,
    StartApplicationSessionResponse, StopApplicationSession, StopApplicationSessionRequest,
};

/// ECMA-354 application session services
pub const APPL_SESSION_NS: &str = "http://www.ecma-international.org/standards/ecma-354/appl_session";

/// ECMA-323 CSTA XML, edition 3
pub const CSTA_ED3_NS: &str = "http://www.ecma-international.org/standards/ecma-323/csta/ed3";

/// Protocol version requested when opening a session
pub const CSTA_PROTOCOL_VERSION: &str =
    "http://www.ecma-international.org/standards/ecma-323/csta/ed3/priv5";

/// Provider private extensions
pub const PROVIDER_NS: &str = "http://www.pbxnsip.com/schemas/csta";

/// XML Schema instance namespace
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub(crate) const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
