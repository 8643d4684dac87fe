//! Conversion of unsolicited event documents.
//!
//! Events are forwarded to consumers as JSON that mirrors the XML nesting.
//! For routing only, the JSON is additionally flattened into a single
//! string map so the `monitorCrossRefID` can be found wherever it sits.

use std::collections::HashMap;

use serde_json::{Map, Value};
use xmltree::{Element, XMLNode};

use crate::error::{ApiError, Result};
use crate::xml_utils::strip_namespaces;

/// Field carrying the monitor cross-reference id in event documents.
pub const MONITOR_CROSS_REF_FIELD: &str = "monitorCrossRefID";

/// Convert an XML document to JSON.
///
/// The result is an object with a single key, the root element name.
/// Each element becomes:
/// - a plain string when it has neither attributes nor child elements
///   (`""` when empty)
/// - otherwise an object: attributes as `-name`, children by name, text as
///   `#content`
///
/// Repeated sibling elements are collected into an array.
pub fn xml_to_json(xml: &str) -> Result<Value> {
    let stripped = strip_namespaces(xml);
    let root = Element::parse(stripped.as_bytes())
        .map_err(|e| ApiError::ParseError(format!("invalid event document: {}", e)))?;

    let mut document = Map::new();
    document.insert(root.name.clone(), element_to_value(&root));
    Ok(Value::Object(document))
}

fn element_to_value(element: &Element) -> Value {
    let mut fields = Map::new();
    for (name, value) in &element.attributes {
        fields.insert(format!("-{}", name), Value::String(value.clone()));
    }

    let mut text = String::new();
    for child in &element.children {
        match child {
            XMLNode::Element(child) => insert_child(&mut fields, &child.name, element_to_value(child)),
            XMLNode::Text(t) | XMLNode::CData(t) => text.push_str(t.trim()),
            _ => {}
        }
    }

    if fields.is_empty() {
        return Value::String(text);
    }
    if !text.is_empty() {
        fields.insert("#content".to_string(), Value::String(text));
    }
    Value::Object(fields)
}

fn insert_child(fields: &mut Map<String, Value>, name: &str, value: Value) {
    match fields.get_mut(name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(name.to_string(), value);
        }
    }
}

/// Flatten nested objects into one map of string leaves.
///
/// Lossy: when the same key occurs at several depths, the one visited last
/// wins (keys are visited in the object's key order, depth first). Arrays
/// are skipped entirely.
pub fn flatten(value: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    flatten_into(value, &mut out);
    out
}

fn flatten_into(value: &Value, out: &mut HashMap<String, String>) {
    if let Value::Object(map) = value {
        for (key, value) in map {
            match value {
                Value::String(s) => {
                    out.insert(key.clone(), s.clone());
                }
                Value::Object(_) => flatten_into(value, out),
                _ => {}
            }
        }
    }
}

/// Non-empty `monitorCrossRefID` of a flattened event.
pub fn monitor_cross_ref_id(flat: &HashMap<String, String>) -> Option<&str> {
    flat.get(MONITOR_CROSS_REF_FIELD)
        .map(String::as_str)
        .filter(|id| !id.is_empty())
}
