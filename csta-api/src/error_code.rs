//! Provider error documents.
//!
//! When the provider rejects a request it answers with a `CSTAErrorCode`
//! document instead of the positive response. The document holds one child
//! element naming the error category, whose text is the specific reason:
//!
//! ```xml
//! <CSTAErrorCode xmlns="http://www.ecma-international.org/standards/ecma-323/csta/ed3">
//!   <operation>invalidDeviceID</operation>
//! </CSTAErrorCode>
//! ```

use std::fmt;

use xmltree::{Element, XMLNode};

use crate::error::{ApiError, Result};

/// A decoded `CSTAErrorCode` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CstaErrorCode {
    /// Error category element, e.g. `operation`, `security`, `stateIncompatibility`
    pub category: String,
    /// Text of the category element, e.g. `invalidDeviceID`
    pub reason: String,
}

impl CstaErrorCode {
    /// Root element name of provider error documents.
    pub const ROOT: &'static str = "CSTAErrorCode";

    /// Parse a (namespace-stripped) error document.
    ///
    /// The `operation` category wins when present; otherwise the first
    /// category with text, otherwise the first category element at all.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root = Element::parse(xml.as_bytes())
            .map_err(|e| ApiError::ParseError(format!("invalid {} document: {}", Self::ROOT, e)))?;
        if root.name != Self::ROOT {
            return Err(ApiError::ParseError(format!(
                "expected <{}> but received <{}>",
                Self::ROOT,
                root.name
            )));
        }

        let categories: Vec<(String, String)> = root
            .children
            .iter()
            .filter_map(XMLNode::as_element)
            .map(|element| (element.name.clone(), element_text(element)))
            .collect();

        let chosen = categories
            .iter()
            .find(|(name, text)| name == "operation" && !text.is_empty())
            .or_else(|| categories.iter().find(|(_, text)| !text.is_empty()))
            .or_else(|| categories.first())
            .ok_or_else(|| ApiError::ParseError(format!("empty {} document", Self::ROOT)))?;

        let (category, text) = chosen.clone();
        let reason = if text.is_empty() { category.clone() } else { text };
        Ok(Self { category, reason })
    }
}

fn element_text(element: &Element) -> String {
    element
        .get_text()
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

impl fmt::Display for CstaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.category)
    }
}

impl From<CstaErrorCode> for ApiError {
    fn from(error: CstaErrorCode) -> Self {
        ApiError::Provider {
            category: error.category,
            reason: error.reason,
        }
    }
}
