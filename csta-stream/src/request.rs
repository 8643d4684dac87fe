//! Request execution: build → allocate → send → wait → release → parse.

use std::sync::Arc;
use std::time::Duration;

use correlation_store::{keys, CorrelationStore};
use csta_api::CstaOperation;
use provider_client::{FrameSink, InvokeId};

use crate::correlator::ResponseCorrelator;
use crate::error::Result;
use crate::invoke::InvokeAllocator;

/// Runs typed CSTA exchanges over the shared connection.
pub struct RequestExecutor {
    sink: Arc<dyn FrameSink>,
    store: Arc<dyn CorrelationStore>,
    allocator: InvokeAllocator,
    correlator: ResponseCorrelator,
    app_name: String,
    response_timeout: Duration,
    long_running_timeout: Duration,
}

impl RequestExecutor {
    pub fn new(
        sink: Arc<dyn FrameSink>,
        store: Arc<dyn CorrelationStore>,
        allocator: InvokeAllocator,
        correlator: ResponseCorrelator,
        app_name: impl Into<String>,
        response_timeout: Duration,
        long_running_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            store,
            allocator,
            correlator,
            app_name: app_name.into(),
            response_timeout,
            long_running_timeout,
        }
    }

    /// Execute one exchange; the wait is cancelled if shutdown begins.
    ///
    /// `logical_name` is recorded in the InvokeRecord (usually the extension
    /// the request concerns).
    pub async fn execute<O: CstaOperation>(
        &self,
        logical_name: &str,
        request: &O::Request,
    ) -> Result<O::Response> {
        self.run::<O>(logical_name, request, false).await
    }

    /// Execute one exchange whose wait ignores the shutdown signal.
    pub async fn execute_detached<O: CstaOperation>(
        &self,
        logical_name: &str,
        request: &O::Request,
    ) -> Result<O::Response> {
        self.run::<O>(logical_name, request, true).await
    }

    async fn run<O: CstaOperation>(
        &self,
        logical_name: &str,
        request: &O::Request,
        detached: bool,
    ) -> Result<O::Response> {
        let payload = O::build_payload(request)?;

        let invoke_id = if O::LONG_RUNNING {
            self.allocator.allocate_persistent(logical_name).await?
        } else {
            self.allocator.allocate(logical_name).await?
        };

        tracing::debug!(invoke_id = %invoke_id, "Sending {} for {}", O::ACTION, logical_name);
        if let Err(e) = self.sink.send(invoke_id, &payload).await {
            self.release(invoke_id).await;
            return Err(e.into());
        }

        let timeout = if O::LONG_RUNNING {
            self.long_running_timeout
        } else {
            self.response_timeout
        };
        let waited = if detached {
            self.correlator.wait_detached(invoke_id, timeout).await
        } else {
            self.correlator.wait(invoke_id, timeout).await
        };
        self.release(invoke_id).await;

        let response = waited?;
        O::parse_response(&response).map_err(|e| {
            tracing::warn!(invoke_id = %invoke_id, "{} for {} failed: {}", O::ACTION, logical_name, e);
            e.into()
        })
    }

    /// Drop the InvokeRecord and any ResponseRecord of a finished exchange.
    async fn release(&self, invoke_id: InvokeId) {
        if let Err(e) = self.allocator.release(invoke_id).await {
            tracing::warn!(invoke_id = %invoke_id, "Failed to release invoke record: {}", e);
        }
        if let Err(e) = self.store.del(&keys::response_key(invoke_id, &self.app_name)).await {
            tracing::warn!(invoke_id = %invoke_id, "Failed to release response record: {}", e);
        }
    }
}
