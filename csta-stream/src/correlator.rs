//! Response correlation.
//!
//! The connection reader deposits each provider answer in the store under
//! its invoke id; the task that sent the request polls that key until the
//! answer shows up, the deadline passes, the connection drops, or shutdown
//! begins.

use std::sync::Arc;
use std::time::Duration;

use correlation_store::{keys, CorrelationStore};
use provider_client::{ConnectionStatus, InvokeId};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::error::{EngineError, Result};

/// Waits for the ResponseRecord of an invoke id.
pub struct ResponseCorrelator {
    store: Arc<dyn CorrelationStore>,
    app_name: String,
    poll_interval: Duration,
    connection: watch::Receiver<ConnectionStatus>,
    shutdown: watch::Receiver<bool>,
}

impl ResponseCorrelator {
    pub fn new(
        store: Arc<dyn CorrelationStore>,
        app_name: impl Into<String>,
        poll_interval: Duration,
        connection: watch::Receiver<ConnectionStatus>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            app_name: app_name.into(),
            poll_interval,
            connection,
            shutdown,
        }
    }

    /// Wait for the response, giving up early if shutdown begins.
    pub async fn wait(&self, invoke_id: InvokeId, timeout: Duration) -> Result<String> {
        self.poll(invoke_id, timeout, true).await
    }

    /// Wait for the response, ignoring the shutdown signal.
    ///
    /// Used by teardown itself, which runs after shutdown has been signalled.
    pub async fn wait_detached(&self, invoke_id: InvokeId, timeout: Duration) -> Result<String> {
        self.poll(invoke_id, timeout, false).await
    }

    async fn poll(&self, invoke_id: InvokeId, timeout: Duration, cancellable: bool) -> Result<String> {
        let key = keys::response_key(invoke_id, &self.app_name);
        let deadline = Instant::now() + timeout;
        let mut connection = self.connection.clone();
        let mut shutdown = self.shutdown.clone();

        loop {
            if let Some(payload) = self.store.get(&key).await? {
                tracing::debug!(invoke_id = %invoke_id, "Correlated response");
                return Ok(payload);
            }

            if let ConnectionStatus::Disconnected { reason } = &*connection.borrow() {
                return Err(EngineError::ConnectionLost(reason.clone()));
            }
            if cancellable && *shutdown.borrow() {
                return Err(EngineError::Cancelled(invoke_id.to_string()));
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(invoke_id = %invoke_id, "No response within {:?}", timeout);
                return Err(EngineError::Timeout {
                    invoke_id: invoke_id.to_string(),
                    timeout,
                });
            }

            let wake_at = deadline.min(now + self.poll_interval);
            tokio::select! {
                _ = sleep_until(wake_at) => {}
                changed = connection.changed() => {
                    if changed.is_err() {
                        return Err(EngineError::ConnectionLost("connection dropped".to_string()));
                    }
                }
                changed = shutdown.changed(), if cancellable => {
                    if changed.is_err() {
                        return Err(EngineError::Cancelled(invoke_id.to_string()));
                    }
                }
            }
        }
    }
}
