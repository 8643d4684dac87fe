//! Configuration types for the csta-stream crate

use std::time::Duration;

use crate::error::{EngineError, Result};

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Application name; prefixes every store key and identifies the session
    pub app_name: String,

    /// PBX host passed as switch name when resolving devices
    /// Default: "localhost"
    pub pbx_host: String,

    /// Interval between store polls while waiting for a response
    /// Default: 2 seconds
    pub poll_interval: Duration,

    /// Deadline for ordinary request/response exchanges
    /// Default: 60 seconds
    pub response_timeout: Duration,

    /// Deadline for long-running exchanges (monitor start)
    /// Default: 300 seconds
    pub long_running_timeout: Duration,

    /// Lifetime of InvokeRecords
    /// Default: 60 seconds
    pub invoke_ttl: Duration,

    /// Lifetime of ResponseRecords
    /// Default: 60 seconds
    pub response_ttl: Duration,

    /// Session keep-alive period
    /// Default: 30 seconds
    pub heartbeat_interval: Duration,

    /// Seconds the provider keeps monitors after the session is lost
    /// Default: 60
    pub session_cleanup_delay: u32,

    /// Requested session lifetime in seconds
    /// Default: 180
    pub requested_session_duration: u32,

    /// Topic receiving events whose monitor cross-reference is unknown
    /// Default: "csta.unrouted"
    pub unrouted_topic: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "provider-monitoring".to_string(),
            pbx_host: "localhost".to_string(),
            poll_interval: Duration::from_secs(2),
            response_timeout: Duration::from_secs(60),
            long_running_timeout: Duration::from_secs(300),
            invoke_ttl: Duration::from_secs(60),
            response_ttl: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            session_cleanup_delay: 60,
            requested_session_duration: 180,
            unrouted_topic: "csta.unrouted".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration for the given application name with defaults elsewhere.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("app_name", &self.app_name),
            ("pbx_host", &self.pbx_host),
            ("unrouted_topic", &self.unrouted_topic),
        ];
        for (name, value) in names {
            if value.trim().is_empty() {
                return Err(EngineError::Configuration(format!("{} must not be empty", name)));
            }
        }

        let durations = [
            ("poll_interval", self.poll_interval),
            ("response_timeout", self.response_timeout),
            ("long_running_timeout", self.long_running_timeout),
            ("invoke_ttl", self.invoke_ttl),
            ("response_ttl", self.response_ttl),
            ("heartbeat_interval", self.heartbeat_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(EngineError::Configuration(format!("{} must be greater than zero", name)));
            }
        }

        if self.requested_session_duration == 0 {
            return Err(EngineError::Configuration(
                "requested_session_duration must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
