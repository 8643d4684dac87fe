//! Shared CSTA value types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Category of a monitored endpoint.
///
/// The two kinds need different event filters in the monitor-start request:
/// a VDN asks for the broad call-control and call-associated filter, a SKILL
/// only for logical-device-feature events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorType {
    #[serde(rename = "VDN")]
    Vdn,
    #[serde(rename = "SKILL")]
    Skill,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Vdn => "VDN",
            MonitorType::Skill => "SKILL",
        }
    }
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VDN" => Ok(MonitorType::Vdn),
            "SKILL" => Ok(MonitorType::Skill),
            _ => Err(ApiError::InvalidMonitorType(s.to_string())),
        }
    }
}
