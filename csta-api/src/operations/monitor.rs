//! Monitor start and stop.
//!
//! The monitor-start document depends on the monitored endpoint: VDNs ask
//! for every call-control and call-associated event plus the provider's
//! private digit events, SKILL groups only for logical-device-feature events.

use serde::Deserialize;

use super::{CSTA_ED3_NS, PROVIDER_NS, XML_DECLARATION, XSI_NS};
use crate::error::Result;
use crate::operation::{require, CstaOperation, Validate, ValidationError};
use crate::types::MonitorType;
use crate::xml_utils::{escape, expect_root, parse_document};

const VDN_CALL_CONTROL_EVENTS: &[&str] = &[
    "callCleared",
    "conferenced",
    "connectionCleared",
    "delivered",
    "diverted",
    "established",
    "failed",
    "held",
    "networkReached",
    "originated",
    "queued",
    "retrieved",
    "serviceInitiated",
    "transferred",
];

const VDN_CALL_ASSOCIATED_EVENTS: &[&str] = &[
    "callInformation",
    "charging",
    "digitsGenerated",
    "telephonyTonesGenerated",
    "serviceCompletionFailure",
];

pub struct MonitorStart;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStartRequest {
    /// Device identifier returned by [`GetDeviceId`](super::GetDeviceId)
    pub device_id: String,
    pub monitor_type: MonitorType,
}

impl Validate for MonitorStartRequest {
    fn validate_boundary(&self) -> std::result::Result<(), ValidationError> {
        require("deviceObject", &self.device_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitorStartResponse {
    #[serde(rename = "monitorCrossRefID")]
    pub monitor_cross_ref_id: String,
}

fn event_flags(events: &[&str]) -> String {
    events
        .iter()
        .map(|event| format!("<{event}>true</{event}>"))
        .collect()
}

fn monitor_filter(monitor_type: MonitorType) -> String {
    match monitor_type {
        MonitorType::Vdn => format!(
            "<requestedMonitorFilter>\
<callcontrol>{}</callcontrol>\
<callAssociated>{}</callAssociated>\
<logicalDeviceFeature/>\
</requestedMonitorFilter>\
<monitorType>call</monitorType>\
<extensions><privateData><private>\
<Events xmlns:xsi=\"{}\" xmlns=\"\">\
<invertFilter xmlns=\"{}\">true</invertFilter>\
<callControlPrivate xmlns=\"{}\"><enteredDigits>true</enteredDigits></callControlPrivate>\
</Events>\
</private></privateData></extensions>",
            event_flags(VDN_CALL_CONTROL_EVENTS),
            event_flags(VDN_CALL_ASSOCIATED_EVENTS),
            XSI_NS,
            PROVIDER_NS,
            PROVIDER_NS,
        ),
        MonitorType::Skill => {
            "<requestedMonitorFilter><logicalDeviceFeature/></requestedMonitorFilter>".to_string()
        }
    }
}

impl CstaOperation for MonitorStart {
    type Request = MonitorStartRequest;
    type Response = MonitorStartResponse;

    const ACTION: &'static str = "MonitorStart";
    const EXPECTED_ROOT: &'static str = "MonitorStartResponse";
    const LONG_RUNNING: bool = true;

    fn build_payload(request: &Self::Request) -> Result<String> {
        request.validate_boundary()?;
        Ok(format!(
            "{}<MonitorStart xmlns=\"{}\">\
<monitorObject>\
<deviceObject typeOfNumber=\"other\" mediaClass=\"notKnown\" bitRate=\"constant\">{}</deviceObject>\
</monitorObject>\
{}\
</MonitorStart>",
            XML_DECLARATION,
            CSTA_ED3_NS,
            escape(&request.device_id),
            monitor_filter(request.monitor_type),
        ))
    }

    fn parse_response(xml: &str) -> Result<Self::Response> {
        parse_document(xml, Self::EXPECTED_ROOT)
    }
}

pub struct MonitorStop;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStopRequest {
    pub monitor_cross_ref_id: String,
}

impl Validate for MonitorStopRequest {
    fn validate_boundary(&self) -> std::result::Result<(), ValidationError> {
        require("monitorCrossRefID", &self.monitor_cross_ref_id)
    }
}

impl CstaOperation for MonitorStop {
    type Request = MonitorStopRequest;
    type Response = ();

    const ACTION: &'static str = "MonitorStop";
    const EXPECTED_ROOT: &'static str = "MonitorStopResponse";

    fn build_payload(request: &Self::Request) -> Result<String> {
        request.validate_boundary()?;
        Ok(format!(
            "{}<MonitorStop xmlns=\"{}\">\
<monitorCrossRefID>{}</monitorCrossRefID>\
</MonitorStop>",
            XML_DECLARATION,
            CSTA_ED3_NS,
            escape(&request.monitor_cross_ref_id),
        ))
    }

    fn parse_response(xml: &str) -> Result<Self::Response> {
        expect_root(xml, Self::EXPECTED_ROOT).map(|_| ())
    }
}
