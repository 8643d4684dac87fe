//! Scripted provider shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use correlation_store::{keys, CorrelationStore, MemoryStore, StoreError};
use csta_api::xml_utils::root_element_name;
use parking_lot::Mutex;
use provider_client::{ConnectionStatus, FrameSink, InvokeId, ProviderError};
use tokio::sync::watch;

use crate::broker::FanoutBroker;
use crate::config::EngineConfig;
use crate::correlator::ResponseCorrelator;
use crate::invoke::InvokeAllocator;
use crate::request::RequestExecutor;

/// Text of the first `<name>` element of a document.
pub(crate) fn element_text<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}>", name);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&format!("</{}>", name))? + start;
    Some(&xml[start..end])
}

/// Answers requests by writing canned responses straight into the store,
/// the way the demultiplexer would.
pub(crate) struct ScriptedSink {
    store: Arc<MemoryStore>,
    overrides: Mutex<HashMap<String, Option<String>>>,
    sent: Mutex<Vec<(InvokeId, String, String)>>,
    fail_sends: AtomicBool,
}

impl ScriptedSink {
    fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            overrides: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Replace the answer to a request; `None` leaves it unanswered.
    pub(crate) fn respond(&self, root: &str, reply: Option<&str>) {
        self.overrides
            .lock()
            .insert(root.to_string(), reply.map(str::to_string));
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn sent_roots(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, root, _)| root.clone()).collect()
    }

    pub(crate) fn sent_payloads(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, _, payload)| payload.clone()).collect()
    }

    pub(crate) fn count(&self, root: &str) -> usize {
        self.sent.lock().iter().filter(|(_, r, _)| r == root).count()
    }

    fn reply_for(&self, root: &str, payload: &str) -> Option<String> {
        if let Some(reply) = self.overrides.lock().get(root) {
            return reply.clone();
        }
        match root {
            "StartApplicationSession" => Some(
                "<StartApplicationSessionPosResponse><sessionID>S-1</sessionID>\
<actualProtocolVersion>ed3</actualProtocolVersion>\
<actualSessionDuration>180</actualSessionDuration></StartApplicationSessionPosResponse>"
                    .to_string(),
            ),
            "ResetApplicationSessionTimer" => Some(
                "<ResetApplicationSessionTimerPosResponse><actualSessionDuration>240</actualSessionDuration>\
</ResetApplicationSessionTimerPosResponse>"
                    .to_string(),
            ),
            "StopApplicationSession" => Some("<StopApplicationSessionPosResponse/>".to_string()),
            "GetDeviceId" => element_text(payload, "extension").map(|extension| {
                format!(
                    "<GetDeviceIdResponse><device typeOfNumber=\"other\">N&lt;{}&gt;</device></GetDeviceIdResponse>",
                    extension
                )
            }),
            "MonitorStart" => Some(format!(
                "<MonitorStartResponse><monitorCrossRefID>{}</monitorCrossRefID></MonitorStartResponse>",
                100 + self.count("MonitorStart")
            )),
            "MonitorStop" => Some("<MonitorStopResponse/>".to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl FrameSink for ScriptedSink {
    async fn send(&self, invoke_id: InvokeId, payload: &str) -> provider_client::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ProviderError::NotConnected);
        }
        let root = root_element_name(payload).unwrap_or_default();
        self.sent.lock().push((invoke_id, root.clone(), payload.to_string()));

        if let Some(reply) = self.reply_for(&root, payload) {
            self.store
                .set(&keys::response_key(invoke_id, "app"), &reply)
                .await
                .map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;
        }
        Ok(())
    }
}

/// Engine components wired to a [`ScriptedSink`].
pub(crate) struct Harness {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) broker: Arc<FanoutBroker>,
    pub(crate) sink: Arc<ScriptedSink>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) executor: Arc<RequestExecutor>,
    pub(crate) connection_tx: watch::Sender<ConnectionStatus>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let broker = Arc::new(FanoutBroker::new());
        let sink = Arc::new(ScriptedSink::new(store.clone()));
        let config = Arc::new(EngineConfig {
            pbx_host: "pbx".to_string(),
            poll_interval: Duration::from_millis(10),
            response_timeout: Duration::from_secs(1),
            long_running_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(1),
            ..EngineConfig::new("app")
        });
        let (connection_tx, connection_rx) = watch::channel(ConnectionStatus::Connected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let executor = Arc::new(RequestExecutor::new(
            sink.clone(),
            store.clone(),
            InvokeAllocator::new(store.clone(), &config.app_name, config.invoke_ttl),
            ResponseCorrelator::new(
                store.clone(),
                &config.app_name,
                config.poll_interval,
                connection_rx,
                shutdown_rx,
            ),
            &config.app_name,
            config.response_timeout,
            config.long_running_timeout,
        ));

        Self {
            store,
            broker,
            sink,
            config,
            executor,
            connection_tx,
            shutdown_tx,
        }
    }
}

/// Delegates to a [`MemoryStore`] with switchable faults: failing reads and
/// slow set-membership writes.
pub(crate) struct FaultyStore {
    inner: Arc<MemoryStore>,
    fail_gets: AtomicBool,
    sadd_delay: Mutex<Option<Duration>>,
}

impl FaultyStore {
    pub(crate) fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_gets: AtomicBool::new(false),
            sadd_delay: Mutex::new(None),
        }
    }

    pub(crate) fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn delay_sadd(&self, delay: Duration) {
        *self.sadd_delay.lock() = Some(delay);
    }
}

#[async_trait]
impl CorrelationStore for FaultyStore {
    async fn ping(&self) -> correlation_store::Result<()> {
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> correlation_store::Result<Option<String>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read timed out".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> correlation_store::Result<()> {
        self.inner.set(key, value).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> correlation_store::Result<()> {
        self.inner.set_ex(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> correlation_store::Result<bool> {
        self.inner.exists(key).await
    }

    async fn del(&self, key: &str) -> correlation_store::Result<bool> {
        self.inner.del(key).await
    }

    async fn incr(&self, key: &str) -> correlation_store::Result<i64> {
        self.inner.incr(key).await
    }

    async fn sadd(&self, key: &str, member: &str) -> correlation_store::Result<bool> {
        let delay = *self.sadd_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.sadd(key, member).await
    }

    async fn srem(&self, key: &str, member: &str) -> correlation_store::Result<bool> {
        self.inner.srem(key, member).await
    }

    async fn smembers(&self, key: &str) -> correlation_store::Result<Vec<String>> {
        self.inner.smembers(key).await
    }

    async fn scan(&self, pattern: &str) -> correlation_store::Result<Vec<String>> {
        self.inner.scan(pattern).await
    }

    async fn close(&self) -> correlation_store::Result<()> {
        self.inner.close().await
    }
}
