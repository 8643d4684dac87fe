//! Invoke id allocation.

use std::sync::Arc;
use std::time::Duration;

use correlation_store::{keys, CorrelationStore};
use provider_client::InvokeId;
use tokio::sync::Mutex;

use crate::error::Result;

/// Issues invoke ids from the per-application counter in the store.
///
/// Ids run `0001..=9998`, then wrap to `0000`; `9999` is reserved for
/// unsolicited events and never handed out. Each allocation also writes an
/// InvokeRecord naming the logical operation the id was issued for.
///
/// # Capacity
///
/// The id space holds 9999 values. An application must never have more
/// than that many requests awaiting a response at once: past that point the
/// counter wraps onto an id that is still in flight and its correlation
/// entries are silently overwritten.
pub struct InvokeAllocator {
    store: Arc<dyn CorrelationStore>,
    app_name: String,
    invoke_ttl: Duration,
    /// Serialises increment-and-wrap so a wrap is observed exactly once
    wrap_lock: Mutex<()>,
}

impl InvokeAllocator {
    pub fn new(store: Arc<dyn CorrelationStore>, app_name: impl Into<String>, invoke_ttl: Duration) -> Self {
        Self {
            store,
            app_name: app_name.into(),
            invoke_ttl,
            wrap_lock: Mutex::new(()),
        }
    }

    /// Allocate an id whose InvokeRecord expires after the configured TTL.
    pub async fn allocate(&self, logical_name: &str) -> Result<InvokeId> {
        let invoke_id = self.next_id().await?;
        self.store
            .set_ex(
                &keys::invoke_record_key(invoke_id, &self.app_name),
                logical_name,
                self.invoke_ttl,
            )
            .await?;
        tracing::debug!(invoke_id = %invoke_id, "Allocated invoke id for {}", logical_name);
        Ok(invoke_id)
    }

    /// Allocate an id whose InvokeRecord never expires.
    ///
    /// For exchanges with no bounded completion window; the caller must
    /// [`release`](Self::release) the id.
    pub async fn allocate_persistent(&self, logical_name: &str) -> Result<InvokeId> {
        let invoke_id = self.next_id().await?;
        self.store
            .set(&keys::invoke_record_key(invoke_id, &self.app_name), logical_name)
            .await?;
        tracing::debug!(invoke_id = %invoke_id, "Allocated persistent invoke id for {}", logical_name);
        Ok(invoke_id)
    }

    /// Delete the InvokeRecord of an id.
    pub async fn release(&self, invoke_id: InvokeId) -> Result<()> {
        self.store
            .del(&keys::invoke_record_key(invoke_id, &self.app_name))
            .await?;
        Ok(())
    }

    async fn next_id(&self) -> Result<InvokeId> {
        let _guard = self.wrap_lock.lock().await;
        let counter_key = keys::invoke_counter_key(&self.app_name);

        let value = self.store.incr(&counter_key).await?;
        match u16::try_from(value).ok().and_then(InvokeId::new) {
            Some(invoke_id) if !invoke_id.is_unsolicited() => Ok(invoke_id),
            _ => {
                self.store.set(&counter_key, "0").await?;
                tracing::debug!("Invoke id counter for {} wrapped", self.app_name);
                Ok(InvokeId::ZERO)
            }
        }
    }
}
