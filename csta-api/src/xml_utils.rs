//! XML helpers shared by every CSTA operation.
//!
//! Provider documents carry namespace prefixes (`ns1:`, `xsi:`) and default
//! namespace declarations. Everything is parsed after stripping those so the
//! serde structs only deal with local names.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, Result};
use crate::error_code::CstaErrorCode;

/// Strip namespace prefixes and `xmlns` declarations from every tag.
///
/// Declarations, comments and CDATA sections are copied untouched, as is
/// text content and attribute values.
///
/// # Example
///
/// Input: `<ns1:SessionLoginInfo xmlns:ns1="urn:x"><ns1:userName>u</ns1:userName></ns1:SessionLoginInfo>`
/// Output: `<SessionLoginInfo><userName>u</userName></SessionLoginInfo>`
pub fn strip_namespaces(xml: &str) -> String {
    let mut result = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        result.push_str(&rest[..start]);
        rest = &rest[start..];

        let Some(end) = tag_end(rest) else {
            break;
        };
        let tag = &rest[..=end];
        if tag.starts_with("<?") || tag.starts_with("<!") {
            result.push_str(tag);
        } else {
            strip_tag(tag, &mut result);
        }
        rest = &rest[end + 1..];
    }

    result.push_str(rest);
    result
}

/// Index of the `>` closing the markup that starts at `s[0] == '<'`.
fn tag_end(s: &str) -> Option<usize> {
    if s.starts_with("<!--") {
        return s.find("-->").map(|i| i + 2);
    }
    if s.starts_with("<![CDATA[") {
        return s.find("]]>").map(|i| i + 2);
    }

    let mut quote = None;
    for (i, c) in s.char_indices().skip(1) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return Some(i),
            None => {}
        }
    }
    None
}

fn local_name(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, local)| local)
}

fn strip_tag(tag: &str, out: &mut String) {
    let inner = &tag[1..tag.len() - 1];
    let (closing, inner) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };
    let (self_closing, inner) = match inner.trim_end().strip_suffix('/') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };

    let name_end = inner.find(char::is_whitespace).unwrap_or(inner.len());
    out.push('<');
    if closing {
        out.push('/');
    }
    out.push_str(local_name(&inner[..name_end]));

    let mut attrs = &inner[name_end..];
    loop {
        attrs = attrs.trim_start();
        let Some(eq) = attrs.find('=') else {
            break;
        };
        let name = attrs[..eq].trim();
        let after = attrs[eq + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            break;
        };
        let Some(close) = after[1..].find(quote) else {
            break;
        };
        let value = &after[1..1 + close];
        attrs = &after[close + 2..];

        if name == "xmlns" || name.starts_with("xmlns:") {
            continue;
        }
        out.push(' ');
        out.push_str(local_name(name));
        out.push('=');
        out.push(quote);
        out.push_str(value);
        out.push(quote);
    }

    if self_closing {
        out.push('/');
    }
    out.push('>');
}

/// Local name of the document's root element, skipping the XML declaration,
/// comments and whitespace. `None` if there is no element at all.
pub fn root_element_name(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Check that a response document has the expected root element.
///
/// Returns the namespace-stripped document on success. A `CSTAErrorCode`
/// document becomes [`ApiError::Provider`]; anything else is a parse error.
pub fn expect_root(xml: &str, expected_root: &str) -> Result<String> {
    let stripped = strip_namespaces(xml);
    match root_element_name(&stripped) {
        Some(root) if root == expected_root => Ok(stripped),
        Some(root) if root == CstaErrorCode::ROOT => {
            let error = CstaErrorCode::from_xml(&stripped)?;
            Err(error.into())
        }
        Some(root) => Err(ApiError::ParseError(format!(
            "expected <{}> but received <{}>",
            expected_root, root
        ))),
        None => Err(ApiError::ParseError(format!(
            "expected <{}> but received no XML document",
            expected_root
        ))),
    }
}

/// Parse a response document into `T` after checking its root element.
pub fn parse_document<T: DeserializeOwned>(xml: &str, expected_root: &str) -> Result<T> {
    let stripped = expect_root(xml, expected_root)?;
    quick_xml::de::from_str(&stripped)
        .map_err(|e| ApiError::ParseError(format!("<{}>: {}", expected_root, e)))
}

/// Escape a value for interpolation into element text.
pub fn escape(value: &str) -> std::borrow::Cow<'_, str> {
    quick_xml::escape::escape(value)
}
