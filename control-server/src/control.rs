//! The operations the HTTP surface drives.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

/// Confirmation of a started monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedMonitor {
    pub monitor_type: String,
    pub extension: String,
    pub monitor_cross_ref_id: String,
}

/// Confirmation of a stopped monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedMonitor {
    pub extension: String,
    pub monitor_cross_ref_id: String,
    /// The provider did not acknowledge the stop; local state was cleared anyway
    pub warning: Option<String>,
}

/// Monitoring operations exposed over HTTP.
///
/// Errors are plain text; they are returned to the HTTP client verbatim
/// with a 400 status.
#[async_trait]
pub trait MonitoringControl: Send + Sync + 'static {
    async fn start(&self, monitor_type: &str, extension: &str) -> Result<StartedMonitor, String>;

    async fn stop(&self, extension: &str) -> Result<StoppedMonitor, String>;

    /// Ids of every monitored extension.
    async fn list(&self) -> Result<Vec<String>, String>;

    /// Live feed of the events published to a topic, if the broker supports it.
    fn subscribe(&self, _topic: &str) -> Option<broadcast::Receiver<Bytes>> {
        None
    }
}
