//! Device resolution: extension number to provider device identifier.

use serde::Deserialize;

use super::{PROVIDER_NS, XML_DECLARATION};
use crate::error::Result;
use crate::operation::{require, CstaOperation, Validate, ValidationError};
use crate::xml_utils::{escape, parse_document};

pub struct GetDeviceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDeviceIdRequest {
    /// PBX host the extension lives on
    pub switch_name: String,
    pub extension: String,
}

impl Validate for GetDeviceIdRequest {
    fn validate_boundary(&self) -> std::result::Result<(), ValidationError> {
        require("switchName", &self.switch_name)?;
        require("extension", &self.extension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GetDeviceIdResponse {
    pub device: Device,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Device {
    #[serde(rename = "@typeOfNumber", default)]
    pub type_of_number: Option<String>,
    #[serde(rename = "@mediaClass", default)]
    pub media_class: Option<String>,
    #[serde(rename = "@bitRate", default)]
    pub bit_rate: Option<String>,
    #[serde(rename = "$text", default)]
    pub id: String,
}

impl CstaOperation for GetDeviceId {
    type Request = GetDeviceIdRequest;
    type Response = GetDeviceIdResponse;

    const ACTION: &'static str = "GetDeviceId";
    const EXPECTED_ROOT: &'static str = "GetDeviceIdResponse";

    fn build_payload(request: &Self::Request) -> Result<String> {
        request.validate_boundary()?;
        Ok(format!(
            "{}<GetDeviceId xmlns=\"{}\">\
<switchName>{}</switchName>\
<extension>{}</extension>\
</GetDeviceId>",
            XML_DECLARATION,
            PROVIDER_NS,
            escape(&request.switch_name),
            escape(&request.extension),
        ))
    }

    fn parse_response(xml: &str) -> Result<Self::Response> {
        parse_document(xml, Self::EXPECTED_ROOT)
    }
}
