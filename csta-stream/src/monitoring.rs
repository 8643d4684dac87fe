//! Per-extension monitoring state machine.
//!
//! `Unmonitored → ResolvingDevice → StartingMonitor → Monitoring → Stopping → Unmonitored`
//!
//! Every monitored extension is persisted three ways: its record under the
//! extension key, the cross-reference to extension mapping used for event
//! routing, and membership of the monitored set. The manager also keeps an
//! in-memory copy for teardown. All four are updated together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use correlation_store::{keys, CorrelationStore};
use csta_api::operations::{
    GetDeviceId, GetDeviceIdRequest, MonitorStart, MonitorStartRequest, MonitorStop,
    MonitorStopRequest,
};
use csta_api::{ApiError, MonitorType, ValidationError};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock as GateLock};

use crate::broker::Broker;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::request::RequestExecutor;
use crate::types::{ExtensionRecord, MonitorState, StopOutcome};

/// Owns every monitor of the engine.
pub struct MonitoringManager {
    executor: Arc<RequestExecutor>,
    store: Arc<dyn CorrelationStore>,
    broker: Arc<dyn Broker>,
    config: Arc<EngineConfig>,
    records: RwLock<HashMap<String, ExtensionRecord>>,
    states: RwLock<HashMap<String, MonitorState>>,
    /// One lock per extension; start and stop of the same extension never overlap
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Held shared by every start; taken exclusively once by [`Self::quiesce`]
    gate: GateLock<()>,
    closed: AtomicBool,
}

/// Exclusive access to one extension. The lock entry is dropped from the map
/// on release when nobody else holds or awaits it.
struct ExtensionGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    extension: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ExtensionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Two references left: the map's and ours
        self.locks.remove_if(&self.extension, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

impl MonitoringManager {
    pub fn new(
        executor: Arc<RequestExecutor>,
        store: Arc<dyn CorrelationStore>,
        broker: Arc<dyn Broker>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            executor,
            store,
            broker,
            config,
            records: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            locks: DashMap::new(),
            gate: GateLock::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Start monitoring an extension.
    ///
    /// An extension that is already monitored is stopped first, so it never
    /// has two monitors at once; the restarted monitor gets a new
    /// cross-reference id. If the previous monitor cannot be looked up, the
    /// restart is abandoned and that error returned.
    ///
    /// Fails with [`EngineError::ShuttingDown`] once [`Self::quiesce`] ran.
    pub async fn start(&self, extension: &str, monitor_type: MonitorType) -> Result<ExtensionRecord> {
        if extension.trim().is_empty() {
            return Err(ApiError::from(ValidationError::missing("extension")).into());
        }

        let _gate = self.gate.read().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }
        let _guard = self.lock_extension(extension).await;

        let extension_key = keys::extension_key(extension, &self.config.app_name);
        if self.store.exists(&extension_key).await? {
            tracing::info!("Extension {} is already monitored, stopping it first", extension);
            match self.stop_locked(extension, false).await {
                Ok(StopOutcome { error: Some(e), .. }) => {
                    tracing::warn!("Previous monitor of {} was not acknowledged: {}", extension, e)
                }
                Ok(_) => {}
                // Stopped concurrently by another process sharing the store
                Err(EngineError::ExtensionNotFound(_)) => {}
                Err(e) => {
                    tracing::error!("Could not stop previous monitor of {}: {}", extension, e);
                    return Err(e);
                }
            }
        }

        match self.start_locked(extension, monitor_type).await {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::warn!("Monitoring {} ({}) failed: {}", extension, monitor_type, e);
                self.states.write().remove(extension);
                if let Err(delete_error) = self.broker.delete_topic(extension).await {
                    tracing::debug!("Could not delete topic {}: {}", extension, delete_error);
                }
                Err(e)
            }
        }
    }

    /// Stop monitoring an extension.
    pub async fn stop(&self, extension: &str) -> Result<StopOutcome> {
        let _guard = self.lock_extension(extension).await;
        self.stop_locked(extension, false).await
    }

    /// Stop monitoring without honouring the shutdown signal. Used by teardown.
    pub async fn stop_detached(&self, extension: &str) -> Result<StopOutcome> {
        let _guard = self.lock_extension(extension).await;
        self.stop_locked(extension, true).await
    }

    /// Refuse new starts and wait for the ones in flight to settle, so a
    /// [`Self::snapshot`] taken afterwards covers every monitor.
    pub async fn quiesce(&self) {
        let _gate = self.gate.write().await;
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Monitoring closed to new starts");
        }
    }

    /// Ids in the store-backed monitored set, sorted.
    pub async fn monitored(&self) -> Result<Vec<String>> {
        let mut extensions = self
            .store
            .smembers(&keys::monitored_set_key(&self.config.app_name))
            .await?;
        extensions.sort();
        Ok(extensions)
    }

    /// In-memory records, sorted by extension.
    pub fn snapshot(&self) -> Vec<ExtensionRecord> {
        let mut records: Vec<ExtensionRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn record(&self, extension: &str) -> Option<ExtensionRecord> {
        self.records.read().get(extension).cloned()
    }

    pub fn state(&self, extension: &str) -> MonitorState {
        self.states
            .read()
            .get(extension)
            .copied()
            .unwrap_or(MonitorState::Unmonitored)
    }

    async fn lock_extension(&self, extension: &str) -> ExtensionGuard<'_> {
        let lock = self.locks.entry(extension.to_string()).or_default().clone();
        let guard = lock.clone().lock_owned().await;
        ExtensionGuard {
            locks: &self.locks,
            extension: extension.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    fn set_state(&self, extension: &str, state: MonitorState) {
        self.states.write().insert(extension.to_string(), state);
    }

    async fn start_locked(&self, extension: &str, monitor_type: MonitorType) -> Result<ExtensionRecord> {
        self.broker.declare_topic(extension).await?;

        self.set_state(extension, MonitorState::ResolvingDevice);
        let device_id = self
            .executor
            .execute::<GetDeviceId>(
                extension,
                &GetDeviceIdRequest {
                    switch_name: self.config.pbx_host.clone(),
                    extension: extension.to_string(),
                },
            )
            .await?
            .device
            .id;

        self.set_state(extension, MonitorState::StartingMonitor);
        let monitor_cross_ref_id = self
            .executor
            .execute::<MonitorStart>(
                extension,
                &MonitorStartRequest {
                    device_id: device_id.clone(),
                    monitor_type,
                },
            )
            .await?
            .monitor_cross_ref_id;

        let record = ExtensionRecord {
            id: extension.to_string(),
            monitor_type,
            device_id,
            monitor_cross_ref_id,
        };
        if let Err(e) = self.persist(&record).await {
            self.abandon(&record).await;
            return Err(e);
        }

        self.records
            .write()
            .insert(record.id.clone(), record.clone());
        self.set_state(extension, MonitorState::Monitoring);
        tracing::info!(
            "Monitoring on {}: {} started (MonitorCrossRefID: {})",
            monitor_type,
            extension,
            record.monitor_cross_ref_id
        );
        Ok(record)
    }

    async fn persist(&self, record: &ExtensionRecord) -> Result<()> {
        let app_name = &self.config.app_name;
        let json = serde_json::to_string(record).map_err(|e| EngineError::CorruptRecord {
            extension: record.id.clone(),
            reason: e.to_string(),
        })?;

        self.store
            .set(&keys::cross_ref_key(&record.monitor_cross_ref_id, app_name), &record.id)
            .await?;
        self.store
            .set(&keys::extension_key(&record.id, app_name), &json)
            .await?;
        self.store
            .sadd(&keys::monitored_set_key(app_name), &record.id)
            .await?;
        Ok(())
    }

    /// Undo a monitor that started on the provider but could not be persisted.
    async fn abandon(&self, record: &ExtensionRecord) {
        let request = MonitorStopRequest {
            monitor_cross_ref_id: record.monitor_cross_ref_id.clone(),
        };
        if let Err(e) = self
            .executor
            .execute::<MonitorStop>(&record.id, &request)
            .await
        {
            tracing::warn!("Could not stop unpersisted monitor of {}: {}", record.id, e);
        }
        self.forget(&record.id, Some(&record.monitor_cross_ref_id)).await;
    }

    async fn stop_locked(&self, extension: &str, detached: bool) -> Result<StopOutcome> {
        let raw = self
            .store
            .get(&keys::extension_key(extension, &self.config.app_name))
            .await?
            .ok_or_else(|| EngineError::ExtensionNotFound(extension.to_string()))?;

        let record: ExtensionRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Discarding unreadable record of {}: {}", extension, e);
                self.forget(extension, None).await;
                return Err(EngineError::CorruptRecord {
                    extension: extension.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        self.set_state(extension, MonitorState::Stopping);
        let request = MonitorStopRequest {
            monitor_cross_ref_id: record.monitor_cross_ref_id.clone(),
        };
        let result = if detached {
            self.executor
                .execute_detached::<MonitorStop>(extension, &request)
                .await
        } else {
            self.executor.execute::<MonitorStop>(extension, &request).await
        };
        let error = result.err();
        if let Some(e) = &error {
            tracing::warn!("MonitorStop for {} failed, cleaning up anyway: {}", extension, e);
        }

        self.forget(extension, Some(&record.monitor_cross_ref_id)).await;
        tracing::info!(
            "Monitoring on {} stopped (MonitorCrossRefID: {})",
            extension,
            record.monitor_cross_ref_id
        );
        Ok(StopOutcome { record, error })
    }

    /// Remove every trace of an extension. Store failures are logged.
    async fn forget(&self, extension: &str, monitor_cross_ref_id: Option<&str>) {
        let app_name = &self.config.app_name;

        if let Err(e) = self.store.srem(&keys::monitored_set_key(app_name), extension).await {
            tracing::warn!("Failed to remove {} from the monitored set: {}", extension, e);
        }
        if let Err(e) = self.store.del(&keys::extension_key(extension, app_name)).await {
            tracing::warn!("Failed to delete record of {}: {}", extension, e);
        }
        if let Some(cross_ref) = monitor_cross_ref_id {
            if let Err(e) = self.store.del(&keys::cross_ref_key(cross_ref, app_name)).await {
                tracing::warn!("Failed to delete cross reference {}: {}", cross_ref, e);
            }
        }

        self.records.write().remove(extension);
        self.states.write().remove(extension);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{element_text, FaultyStore, Harness};
    use correlation_store::StoreError;
    use provider_client::ConnectionStatus;
    use std::time::Duration;

    fn manager(harness: &Harness) -> MonitoringManager {
        MonitoringManager::new(
            harness.executor.clone(),
            harness.store.clone(),
            harness.broker.clone(),
            harness.config.clone(),
        )
    }

    fn manager_over(harness: &Harness, store: Arc<FaultyStore>) -> MonitoringManager {
        MonitoringManager::new(
            harness.executor.clone(),
            store,
            harness.broker.clone(),
            harness.config.clone(),
        )
    }

    #[tokio::test]
    async fn test_start_persists_everything() {
        let harness = Harness::new();
        let monitoring = manager(&harness);

        let record = monitoring.start("1001", MonitorType::Vdn).await.unwrap();
        assert_eq!(record.id, "1001");
        assert_eq!(record.device_id, "N<1001>");
        assert_eq!(record.monitor_cross_ref_id, "101");
        assert_eq!(record.monitor_type, MonitorType::Vdn);

        let store = &harness.store;
        assert_eq!(store.get("app:crossref:101").await.unwrap().as_deref(), Some("1001"));
        let persisted: ExtensionRecord =
            serde_json::from_str(&store.get("app:extension:1001").await.unwrap().unwrap()).unwrap();
        assert_eq!(persisted, record);
        assert_eq!(monitoring.monitored().await.unwrap(), vec!["1001"]);
        assert_eq!(monitoring.snapshot(), vec![record]);
        assert_eq!(monitoring.state("1001"), MonitorState::Monitoring);
        assert!(harness.broker.has_topic("1001"));

        assert_eq!(harness.sink.sent_roots(), vec!["GetDeviceId", "MonitorStart"]);
        let payloads = harness.sink.sent_payloads();
        assert_eq!(element_text(&payloads[0], "switchName"), Some("pbx"));
        assert!(payloads[1].contains("<monitorType>call</monitorType>"));
    }

    #[tokio::test]
    async fn test_persisted_record_uses_shared_field_names() {
        let harness = Harness::new();
        let monitoring = manager(&harness);
        monitoring.start("2001", MonitorType::Skill).await.unwrap();

        let raw = harness.store.get("app:extension:2001").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["ID"], "2001");
        assert_eq!(value["Type"], "SKILL");
        assert_eq!(value["DeviceID"], "N<2001>");
        assert_eq!(value["MonitorCrossRefID"], "101");
    }

    #[tokio::test]
    async fn test_restart_stops_previous_monitor_first() {
        let harness = Harness::new();
        let monitoring = manager(&harness);

        let first = monitoring.start("1001", MonitorType::Vdn).await.unwrap();
        let second = monitoring.start("1001", MonitorType::Vdn).await.unwrap();

        assert_ne!(first.monitor_cross_ref_id, second.monitor_cross_ref_id);
        assert_eq!(
            harness.sink.sent_roots(),
            vec!["GetDeviceId", "MonitorStart", "MonitorStop", "GetDeviceId", "MonitorStart"]
        );
        let stop_payload = &harness.sink.sent_payloads()[2];
        assert_eq!(
            element_text(stop_payload, "monitorCrossRefID"),
            Some(first.monitor_cross_ref_id.as_str())
        );

        let store = &harness.store;
        assert!(!store.exists("app:crossref:101").await.unwrap());
        assert_eq!(store.get("app:crossref:102").await.unwrap().as_deref(), Some("1001"));
        assert_eq!(store.scan("app:crossref:*").await.unwrap().len(), 1);
        assert_eq!(monitoring.monitored().await.unwrap(), vec!["1001"]);
    }

    #[tokio::test]
    async fn test_stop_cleans_up_and_returns_record() {
        let harness = Harness::new();
        let monitoring = manager(&harness);
        let record = monitoring.start("1001", MonitorType::Skill).await.unwrap();

        let outcome = monitoring.stop("1001").await.unwrap();
        assert_eq!(outcome.record, record);
        assert!(outcome.error.is_none());

        assert!(monitoring.monitored().await.unwrap().is_empty());
        assert!(monitoring.snapshot().is_empty());
        assert_eq!(monitoring.state("1001"), MonitorState::Unmonitored);
        assert!(harness.store.scan("app:extension:*").await.unwrap().is_empty());
        assert!(harness.store.scan("app:crossref:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_unknown_extension_changes_nothing() {
        let harness = Harness::new();
        let monitoring = manager(&harness);
        monitoring.start("1001", MonitorType::Vdn).await.unwrap();
        let keys_before = harness.store.scan("app:*").await.unwrap();
        let sent_before = harness.sink.sent_roots().len();

        let result = monitoring.stop("9999").await;
        match result {
            Err(EngineError::ExtensionNotFound(extension)) => assert_eq!(extension, "9999"),
            other => panic!("Expected ExtensionNotFound, got {:?}", other),
        }

        let mut keys_after = harness.store.scan("app:*").await.unwrap();
        let mut keys_before = keys_before;
        keys_before.sort();
        keys_after.sort();
        assert_eq!(keys_before, keys_after);
        assert_eq!(harness.sink.sent_roots().len(), sent_before);
        assert_eq!(monitoring.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_stop_still_cleans_up() {
        let harness = Harness::new();
        let monitoring = manager(&harness);
        monitoring.start("1001", MonitorType::Vdn).await.unwrap();
        harness.sink.respond(
            "MonitorStop",
            Some("<CSTAErrorCode><operation>invalidCrossRefID</operation></CSTAErrorCode>"),
        );

        let outcome = monitoring.stop("1001").await.unwrap();
        assert!(matches!(outcome.error, Some(EngineError::Protocol(_))));
        assert!(monitoring.monitored().await.unwrap().is_empty());
        assert!(monitoring.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_leaves_no_trace() {
        let harness = Harness::new();
        harness.sink.respond(
            "GetDeviceId",
            Some("<CSTAErrorCode><operation>invalidDeviceID</operation></CSTAErrorCode>"),
        );
        let monitoring = manager(&harness);

        let result = monitoring.start("1001", MonitorType::Vdn).await;
        assert!(matches!(result, Err(EngineError::Protocol(ApiError::Provider { .. }))));
        assert_eq!(monitoring.state("1001"), MonitorState::Unmonitored);
        assert!(!harness.broker.has_topic("1001"));
        assert!(harness.store.scan("app:extension:*").await.unwrap().is_empty());
        assert!(monitoring.monitored().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_extension_is_rejected_before_sending() {
        let harness = Harness::new();
        let monitoring = manager(&harness);

        let result = monitoring.start("  ", MonitorType::Skill).await;
        assert!(matches!(result, Err(ref e) if e.is_validation()));
        assert!(harness.sink.sent_roots().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_discarded() {
        let harness = Harness::new();
        let monitoring = manager(&harness);
        harness.store.set("app:extension:1001", "not json").await.unwrap();
        harness.store.sadd("app:monitored", "1001").await.unwrap();

        let result = monitoring.stop("1001").await;
        assert!(matches!(result, Err(EngineError::CorruptRecord { .. })));
        assert!(!harness.store.exists("app:extension:1001").await.unwrap());
        assert!(monitoring.monitored().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_stop_and_detached_stop() {
        let harness = Harness::new();
        let monitoring = manager(&harness);
        monitoring.start("1001", MonitorType::Vdn).await.unwrap();
        monitoring.start("1002", MonitorType::Vdn).await.unwrap();
        harness.sink.respond("MonitorStop", None);
        harness.shutdown_tx.send_replace(true);

        let outcome = monitoring.stop("1001").await.unwrap();
        assert!(matches!(outcome.error, Some(EngineError::Cancelled(_))));

        harness.sink.respond("MonitorStop", Some("<MonitorStopResponse/>"));
        let outcome = monitoring.stop_detached("1002").await.unwrap();
        assert!(outcome.error.is_none());
        assert!(monitoring.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_connection_loss_fails_stop_fast_but_cleans_up() {
        let harness = Harness::new();
        let monitoring = manager(&harness);
        monitoring.start("1001", MonitorType::Vdn).await.unwrap();
        harness.sink.respond("MonitorStop", None);
        harness.connection_tx.send_replace(ConnectionStatus::Disconnected {
            reason: "eof".to_string(),
        });

        let outcome = monitoring.stop_detached("1001").await.unwrap();
        assert!(matches!(outcome.error, Some(EngineError::ConnectionLost(_))));
        assert!(monitoring.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_starts_leave_one_monitor() {
        let harness = Harness::new();
        let monitoring = Arc::new(manager(&harness));

        let a = tokio::spawn({
            let monitoring = monitoring.clone();
            async move { monitoring.start("1001", MonitorType::Vdn).await }
        });
        let b = tokio::spawn({
            let monitoring = monitoring.clone();
            async move { monitoring.start("1001", MonitorType::Vdn).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(harness.store.scan("app:crossref:*").await.unwrap().len(), 1);
        assert_eq!(harness.sink.count("MonitorStop"), 1);
        assert_eq!(monitoring.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_is_abandoned_when_previous_monitor_cannot_be_read() {
        let harness = Harness::new();
        let store = Arc::new(FaultyStore::new(harness.store.clone()));
        let monitoring = manager_over(&harness, store.clone());
        let first = monitoring.start("1001", MonitorType::Vdn).await.unwrap();

        store.fail_gets(true);
        let result = monitoring.start("1001", MonitorType::Vdn).await;
        assert!(matches!(result, Err(EngineError::Store(StoreError::Unavailable(_)))));
        store.fail_gets(false);

        // The old monitor is untouched and no second one was opened
        assert_eq!(harness.sink.sent_roots(), vec!["GetDeviceId", "MonitorStart"]);
        assert_eq!(monitoring.snapshot(), vec![first.clone()]);
        assert_eq!(monitoring.state("1001"), MonitorState::Monitoring);
        assert_eq!(harness.store.scan("app:crossref:*").await.unwrap(), vec!["app:crossref:101"]);
        assert!(harness.broker.has_topic("1001"));

        let outcome = monitoring.stop("1001").await.unwrap();
        assert_eq!(outcome.record, first);
    }

    #[tokio::test]
    async fn test_restart_over_corrupt_record_is_abandoned() {
        let harness = Harness::new();
        let monitoring = manager(&harness);
        harness.store.set("app:extension:1001", "not json").await.unwrap();

        let result = monitoring.start("1001", MonitorType::Vdn).await;
        assert!(matches!(result, Err(EngineError::CorruptRecord { .. })));
        assert!(harness.sink.sent_roots().is_empty());

        // The unreadable record was discarded, so the next attempt succeeds
        monitoring.start("1001", MonitorType::Vdn).await.unwrap();
        assert_eq!(harness.sink.sent_roots(), vec!["GetDeviceId", "MonitorStart"]);
    }

    #[tokio::test]
    async fn test_extension_locks_are_released() {
        let harness = Harness::new();
        let monitoring = manager(&harness);

        for n in 0..1000 {
            let result = monitoring.stop(&format!("x{}", n)).await;
            assert!(matches!(result, Err(EngineError::ExtensionNotFound(_))));
        }
        assert_eq!(monitoring.locks.len(), 0);

        monitoring.start("1001", MonitorType::Vdn).await.unwrap();
        monitoring.stop("1001").await.unwrap();
        harness.sink.respond(
            "GetDeviceId",
            Some("<CSTAErrorCode><operation>invalidDeviceID</operation></CSTAErrorCode>"),
        );
        assert!(monitoring.start("1002", MonitorType::Vdn).await.is_err());
        assert_eq!(monitoring.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_lock_survives_while_another_caller_waits() {
        let harness = Harness::new();
        let store = Arc::new(FaultyStore::new(harness.store.clone()));
        store.delay_sadd(Duration::from_millis(200));
        let monitoring = Arc::new(manager_over(&harness, store));

        let first = tokio::spawn({
            let monitoring = monitoring.clone();
            async move { monitoring.start("1001", MonitorType::Vdn).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = tokio::spawn({
            let monitoring = monitoring.clone();
            async move { monitoring.start("1001", MonitorType::Vdn).await }
        });

        first.await.unwrap().unwrap();
        let record = second.await.unwrap().unwrap();
        assert_eq!(record.monitor_cross_ref_id, "102");
        assert_eq!(harness.sink.count("MonitorStop"), 1);
        assert_eq!(monitoring.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_quiesce_waits_for_start_in_flight() {
        let harness = Harness::new();
        let store = Arc::new(FaultyStore::new(harness.store.clone()));
        store.delay_sadd(Duration::from_millis(300));
        let monitoring = Arc::new(manager_over(&harness, store));

        let start = tokio::spawn({
            let monitoring = monitoring.clone();
            async move { monitoring.start("1001", MonitorType::Vdn).await }
        });
        // MonitorStart has been answered; the record is still being persisted
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(monitoring.snapshot().is_empty());

        monitoring.quiesce().await;
        assert_eq!(monitoring.snapshot().len(), 1);
        assert_eq!(monitoring.snapshot()[0].id, "1001");
        assert!(start.await.unwrap().is_ok());

        let late = monitoring.start("1002", MonitorType::Vdn).await;
        assert!(matches!(late, Err(EngineError::ShuttingDown)));
        assert_eq!(harness.sink.count("MonitorStart"), 1);
    }
}
