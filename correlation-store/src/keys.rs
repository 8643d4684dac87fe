//! Key naming.
//!
//! Every key starts with the application name, so several bridge instances
//! (each with its own application session) can share one store without
//! seeing each other's correlations.

use std::fmt::Display;

/// Counter incremented to allocate invoke ids.
pub fn invoke_counter_key(app_name: &str) -> String {
    format!("{}:invoke:counter", app_name)
}

/// InvokeRecord: which logical operation an invoke id was issued for.
pub fn invoke_record_key(invoke_id: impl Display, app_name: &str) -> String {
    format!("{}:invoke:{}", app_name, invoke_id)
}

/// ResponseRecord: raw provider answer for an invoke id.
pub fn response_key(invoke_id: impl Display, app_name: &str) -> String {
    format!("{}:response:{}", app_name, invoke_id)
}

/// Mapping from a monitor cross-reference id to the monitored extension.
pub fn cross_ref_key(monitor_cross_ref_id: &str, app_name: &str) -> String {
    format!("{}:crossref:{}", app_name, monitor_cross_ref_id)
}

/// Persisted extension record.
pub fn extension_key(extension: &str, app_name: &str) -> String {
    format!("{}:extension:{}", app_name, extension)
}

/// Set of monitored extension ids.
pub fn monitored_set_key(app_name: &str) -> String {
    format!("{}:monitored", app_name)
}

/// Scan pattern matching every key of one application.
pub fn app_pattern(app_name: &str) -> String {
    format!("{}:*", app_name)
}
