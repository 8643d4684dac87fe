//! Application session operations: start, keep-alive, stop.

use serde::Deserialize;

use super::{APPL_SESSION_NS, CSTA_PROTOCOL_VERSION, PROVIDER_NS, XML_DECLARATION, XSI_NS};
use crate::error::Result;
use crate::operation::{require, CstaOperation, Validate, ValidationError};
use crate::xml_utils::{escape, expect_root, parse_document};

/// Open an application session with the provider.
pub struct StartApplicationSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartApplicationSessionRequest {
    pub application_id: String,
    pub user: String,
    pub password: String,
    /// Seconds the provider keeps monitors alive after the session drops
    pub session_cleanup_delay: u32,
    /// Requested session lifetime in seconds
    pub requested_session_duration: u32,
}

impl Validate for StartApplicationSessionRequest {
    fn validate_boundary(&self) -> std::result::Result<(), ValidationError> {
        require("applicationID", &self.application_id)?;
        require("userName", &self.user)?;
        if self.requested_session_duration == 0 {
            return Err(ValidationError::invalid_value(
                "requestedSessionDuration",
                self.requested_session_duration,
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartApplicationSessionResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "actualProtocolVersion", default)]
    pub actual_protocol_version: Option<String>,
    #[serde(rename = "actualSessionDuration", default)]
    pub actual_session_duration: Option<u32>,
}

impl CstaOperation for StartApplicationSession {
    type Request = StartApplicationSessionRequest;
    type Response = StartApplicationSessionResponse;

    const ACTION: &'static str = "StartApplicationSession";
    const EXPECTED_ROOT: &'static str = "StartApplicationSessionPosResponse";

    fn build_payload(request: &Self::Request) -> Result<String> {
        request.validate_boundary()?;
        Ok(format!(
            "{decl}<StartApplicationSession xmlns=\"{ns}\">\
<applicationInfo>\
<applicationID>{app}</applicationID>\
<applicationSpecificInfo>\
<ns1:SessionLoginInfo xmlns:ns1=\"{provider}\" xmlns:xsi=\"{xsi}\" xsi:type=\"ns1:SessionLoginInfo\">\
<ns1:userName>{user}</ns1:userName>\
<ns1:password>{password}</ns1:password>\
<ns1:sessionCleanupDelay>{cleanup}</ns1:sessionCleanupDelay>\
</ns1:SessionLoginInfo>\
</applicationSpecificInfo>\
</applicationInfo>\
<requestedProtocolVersions>\
<protocolVersion>{version}</protocolVersion>\
</requestedProtocolVersions>\
<requestedSessionDuration>{duration}</requestedSessionDuration>\
</StartApplicationSession>",
            decl = XML_DECLARATION,
            ns = APPL_SESSION_NS,
            app = escape(&request.application_id),
            provider = PROVIDER_NS,
            xsi = XSI_NS,
            user = escape(&request.user),
            password = escape(&request.password),
            cleanup = request.session_cleanup_delay,
            version = CSTA_PROTOCOL_VERSION,
            duration = request.requested_session_duration,
        ))
    }

    fn parse_response(xml: &str) -> Result<Self::Response> {
        parse_document(xml, Self::EXPECTED_ROOT)
    }
}

/// Keep-alive: extend the lifetime of an open session.
pub struct ResetApplicationSessionTimer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetApplicationSessionTimerRequest {
    pub session_id: String,
    pub requested_session_duration: u32,
}

impl Validate for ResetApplicationSessionTimerRequest {
    fn validate_boundary(&self) -> std::result::Result<(), ValidationError> {
        require("sessionID", &self.session_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResetApplicationSessionTimerResponse {
    #[serde(rename = "actualSessionDuration", default)]
    pub actual_session_duration: Option<u32>,
}

impl CstaOperation for ResetApplicationSessionTimer {
    type Request = ResetApplicationSessionTimerRequest;
    type Response = ResetApplicationSessionTimerResponse;

    const ACTION: &'static str = "ResetApplicationSessionTimer";
    const EXPECTED_ROOT: &'static str = "ResetApplicationSessionTimerPosResponse";

    fn build_payload(request: &Self::Request) -> Result<String> {
        request.validate_boundary()?;
        Ok(format!(
            "{}<ResetApplicationSessionTimer xmlns=\"{}\">\
<sessionID>{}</sessionID>\
<requestedSessionDuration>{}</requestedSessionDuration>\
</ResetApplicationSessionTimer>",
            XML_DECLARATION,
            APPL_SESSION_NS,
            escape(&request.session_id),
            request.requested_session_duration,
        ))
    }

    fn parse_response(xml: &str) -> Result<Self::Response> {
        parse_document(xml, Self::EXPECTED_ROOT)
    }
}

/// Close the application session.
pub struct StopApplicationSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopApplicationSessionRequest {
    pub session_id: String,
}

impl Validate for StopApplicationSessionRequest {
    fn validate_boundary(&self) -> std::result::Result<(), ValidationError> {
        require("sessionID", &self.session_id)
    }
}

impl CstaOperation for StopApplicationSession {
    type Request = StopApplicationSessionRequest;
    type Response = ();

    const ACTION: &'static str = "StopApplicationSession";
    const EXPECTED_ROOT: &'static str = "StopApplicationSessionPosResponse";

    fn build_payload(request: &Self::Request) -> Result<String> {
        request.validate_boundary()?;
        Ok(format!(
            "{}<StopApplicationSession xmlns=\"{}\">\
<sessionID>{}</sessionID>\
<sessionEndReason><definedEndReason>normal</definedEndReason></sessionEndReason>\
</StopApplicationSession>",
            XML_DECLARATION,
            APPL_SESSION_NS,
            escape(&request.session_id),
        ))
    }

    fn parse_response(xml: &str) -> Result<Self::Response> {
        expect_root(xml, Self::EXPECTED_ROOT).map(|_| ())
    }
}
