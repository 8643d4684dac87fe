//! Core types for the csta-stream crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use csta_api::MonitorType;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Persisted record of one monitored extension.
///
/// Stored as JSON under the extension key; field names follow the record
/// format shared with downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Type")]
    pub monitor_type: MonitorType,
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    #[serde(rename = "MonitorCrossRefID")]
    pub monitor_cross_ref_id: String,
}

/// Credentials for opening the application session.
#[derive(Clone)]
pub struct SessionCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The open application session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationSession {
    pub session_id: String,
    pub app_name: String,
    pub established_at: DateTime<Utc>,
    /// Last successful keep-alive
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Session lifetime granted by the provider, in seconds
    pub actual_duration: Option<u32>,
    pub protocol_version: Option<String>,
}

/// Lifecycle of the application session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    NoSession,
    Active,
    Terminating,
    Closed,
}

/// Lifecycle of one extension's monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Unmonitored,
    ResolvingDevice,
    StartingMonitor,
    Monitoring,
    Stopping,
}

/// Result of stopping a monitor.
///
/// Local cleanup always happens once the record is found; `error` carries a
/// failed or unacknowledged monitor-stop request.
#[derive(Debug)]
pub struct StopOutcome {
    pub record: ExtensionRecord,
    pub error: Option<EngineError>,
}

/// An `extension:type` entry of the startup monitoring list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorTarget {
    pub extension: String,
    pub monitor_type: MonitorType,
}

impl FromStr for MonitorTarget {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (extension, monitor_type) = s.split_once(':').ok_or_else(|| {
            EngineError::Configuration(format!("expected extension:type, got '{}'", s.trim()))
        })?;
        let extension = extension.trim();
        if extension.is_empty() {
            return Err(EngineError::Configuration(format!(
                "missing extension in '{}'",
                s.trim()
            )));
        }
        Ok(Self {
            extension: extension.to_string(),
            monitor_type: monitor_type.parse()?,
        })
    }
}

impl MonitorTarget {
    /// Parse a comma separated list such as `"1001:VDN,2001:SKILL"`.
    /// Empty entries are ignored.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, EngineError> {
        list.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(str::parse)
            .collect()
    }
}

/// Outcome of engine teardown.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Extensions whose monitors were stopped and cleaned up
    pub stopped: Vec<String>,
    /// Extensions whose stop failed, with the reason
    pub failed: Vec<(String, String)>,
    /// Whether a stop-session request was sent
    pub session_stop_sent: bool,
    /// Why the stop-session exchange failed, if it did
    pub session_stop_error: Option<String>,
    /// Failures releasing the provider connection, store or broker
    pub release_errors: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.session_stop_error.is_none() && self.release_errors.is_empty()
    }
}
