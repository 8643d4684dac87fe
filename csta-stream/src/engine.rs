//! The protocol engine: wiring and ordered teardown.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use control_server::{MonitoringControl, StartedMonitor, StoppedMonitor};
use correlation_store::CorrelationStore;
use csta_api::MonitorType;
use provider_client::{ConnectOptions, ConnectionStatus, ProviderConnection};
use tokio::sync::{broadcast, watch, Mutex};

use crate::broker::Broker;
use crate::config::EngineConfig;
use crate::correlator::ResponseCorrelator;
use crate::demux::EventDemultiplexer;
use crate::error::{EngineError, Result};
use crate::invoke::InvokeAllocator;
use crate::monitoring::MonitoringManager;
use crate::request::RequestExecutor;
use crate::session::SessionManager;
use crate::types::{
    ApplicationSession, ExtensionRecord, MonitorState, MonitorTarget, SessionCredentials,
    SessionState, StopOutcome, TeardownReport,
};

/// Bridges the provider connection, the correlation store and the broker.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use correlation_store::MemoryStore;
/// use csta_stream::{Engine, EngineConfig, FanoutBroker, SessionCredentials};
/// use provider_client::ConnectOptions;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::connect(
///     EngineConfig::new("provider-monitoring"),
///     "pbx.example.com:4721",
///     &ConnectOptions::default(),
///     Arc::new(MemoryStore::new()),
///     Arc::new(FanoutBroker::new()),
/// )
/// .await?;
///
/// engine
///     .start_session(&SessionCredentials {
///         user: "ctiuser".to_string(),
///         password: "secret".to_string(),
///     })
///     .await?;
/// let record = engine.start_monitoring("1001", "VDN").await?;
/// println!("monitoring 1001 as {}", record.monitor_cross_ref_id);
///
/// let report = engine.shutdown().await;
/// assert!(report.stopped.contains(&"1001".to_string()));
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: Arc<EngineConfig>,
    connection: Arc<ProviderConnection>,
    store: Arc<dyn CorrelationStore>,
    broker: Arc<dyn Broker>,
    session: SessionManager,
    monitoring: MonitoringManager,
    shutdown_tx: watch::Sender<bool>,
    /// Set once teardown has run
    torn_down: Mutex<bool>,
}

impl Engine {
    /// Build an engine over an open connection.
    ///
    /// The connection's frame handler must be an [`EventDemultiplexer`]
    /// built from the same configuration, store and broker.
    pub fn new(
        config: EngineConfig,
        connection: Arc<ProviderConnection>,
        store: Arc<dyn CorrelationStore>,
        broker: Arc<dyn Broker>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let executor = Arc::new(RequestExecutor::new(
            connection.clone(),
            store.clone(),
            InvokeAllocator::new(store.clone(), &config.app_name, config.invoke_ttl),
            ResponseCorrelator::new(
                store.clone(),
                &config.app_name,
                config.poll_interval,
                connection.status_watch(),
                shutdown_rx,
            ),
            &config.app_name,
            config.response_timeout,
            config.long_running_timeout,
        ));

        Ok(Self {
            session: SessionManager::new(executor.clone(), config.clone()),
            monitoring: MonitoringManager::new(executor, store.clone(), broker.clone(), config.clone()),
            config,
            connection,
            store,
            broker,
            shutdown_tx,
            torn_down: Mutex::new(false),
        })
    }

    /// Connect to the provider and build an engine over the connection.
    pub async fn connect(
        config: EngineConfig,
        host: &str,
        options: &ConnectOptions,
        store: Arc<dyn CorrelationStore>,
        broker: Arc<dyn Broker>,
    ) -> Result<Self> {
        config.validate()?;
        store.ping().await?;

        let demux = Arc::new(EventDemultiplexer::new(&config, store.clone(), broker.clone()));
        let connection = ProviderConnection::connect(host, options, demux).await?;
        Self::new(config, Arc::new(connection), store, broker)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the application session and start its heartbeat.
    pub async fn start_session(&self, credentials: &SessionCredentials) -> Result<ApplicationSession> {
        self.ensure_running()?;
        self.session.start(credentials).await
    }

    pub fn session(&self) -> Option<ApplicationSession> {
        self.session.session()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Start monitoring `extension`; `monitor_type` is `VDN` or `SKILL`.
    pub async fn start_monitoring(&self, extension: &str, monitor_type: &str) -> Result<ExtensionRecord> {
        let monitor_type: MonitorType = monitor_type.parse()?;
        self.ensure_running()?;
        if self.session.state() != SessionState::Active {
            return Err(EngineError::NoSession);
        }
        self.monitoring.start(extension, monitor_type).await
    }

    pub async fn stop_monitoring(&self, extension: &str) -> Result<StopOutcome> {
        self.ensure_running()?;
        self.monitoring.stop(extension).await
    }

    /// Ids of every monitored extension, sorted.
    pub async fn monitored_extensions(&self) -> Result<Vec<String>> {
        self.monitoring.monitored().await
    }

    /// In-memory records of the active monitors.
    pub fn monitors(&self) -> Vec<ExtensionRecord> {
        self.monitoring.snapshot()
    }

    pub fn monitor_state(&self, extension: &str) -> MonitorState {
        self.monitoring.state(extension)
    }

    /// Start monitoring a list of extensions, one after the other.
    ///
    /// Failures are logged and skipped. Returns the monitors that started.
    pub async fn monitor_initial(&self, targets: &[MonitorTarget]) -> Vec<ExtensionRecord> {
        let mut started = Vec::with_capacity(targets.len());
        for target in targets {
            match self
                .start_monitoring(&target.extension, target.monitor_type.as_str())
                .await
            {
                Ok(record) => started.push(record),
                Err(EngineError::ShuttingDown) => {
                    tracing::info!("Shutdown started, skipping remaining initial monitors");
                    break;
                }
                Err(e) => tracing::error!(
                    "Failed to monitor {} ({}): {}",
                    target.extension,
                    target.monitor_type,
                    e
                ),
            }
        }
        tracing::info!("Monitoring {} of {} configured extensions", started.len(), targets.len());
        started
    }

    /// Watch the provider connection status.
    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.status_watch()
    }

    /// Whether teardown has begun.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Tear the engine down, in order:
    ///
    /// 1. cancel pending waits and stop the heartbeat
    /// 2. refuse new monitors and let starts already in flight settle
    /// 3. stop every active monitor, one at a time
    /// 4. stop the application session
    /// 5. release the provider connection, the store and the broker
    ///
    /// No step's failure prevents the following steps. Only the first call
    /// does anything; later calls return an empty report.
    pub async fn shutdown(&self) -> TeardownReport {
        let mut torn_down = self.torn_down.lock().await;
        if *torn_down {
            return TeardownReport::default();
        }
        *torn_down = true;

        tracing::info!("Shutting down engine for {}", self.config.app_name);
        self.shutdown_tx.send_replace(true);
        self.session.begin_termination().await;
        self.monitoring.quiesce().await;

        let mut report = TeardownReport::default();
        for record in self.monitoring.snapshot() {
            match self.monitoring.stop_detached(&record.id).await {
                Ok(StopOutcome { error: None, .. }) => report.stopped.push(record.id),
                Ok(StopOutcome { error: Some(e), .. }) => {
                    report.failed.push((record.id, e.to_string()))
                }
                Err(e) => {
                    tracing::warn!("Failed to stop monitoring {}: {}", record.id, e);
                    report.failed.push((record.id, e.to_string()));
                }
            }
        }

        if let Some(result) = self.session.stop().await {
            report.session_stop_sent = true;
            report.session_stop_error = result.err().map(|e| e.to_string());
        }

        if let Err(e) = self.connection.close().await {
            tracing::warn!("Failed to close provider connection: {}", e);
            report.release_errors.push(format!("provider connection: {}", e));
        }
        if let Err(e) = self.store.close().await {
            tracing::warn!("Failed to close store: {}", e);
            report.release_errors.push(format!("store: {}", e));
        }
        if let Err(e) = self.broker.close().await {
            tracing::warn!("Failed to close broker: {}", e);
            report.release_errors.push(format!("broker: {}", e));
        }

        tracing::info!(
            "Engine shut down: {} monitors stopped, {} failed",
            report.stopped.len(),
            report.failed.len()
        );
        report
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shutting_down() {
            Err(EngineError::ShuttingDown)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MonitoringControl for Engine {
    async fn start(&self, monitor_type: &str, extension: &str) -> std::result::Result<StartedMonitor, String> {
        self.start_monitoring(extension, monitor_type)
            .await
            .map(|record| StartedMonitor {
                monitor_type: record.monitor_type.to_string(),
                extension: record.id,
                monitor_cross_ref_id: record.monitor_cross_ref_id,
            })
            .map_err(|e| e.to_string())
    }

    async fn stop(&self, extension: &str) -> std::result::Result<StoppedMonitor, String> {
        self.stop_monitoring(extension)
            .await
            .map(|outcome| StoppedMonitor {
                extension: outcome.record.id,
                monitor_cross_ref_id: outcome.record.monitor_cross_ref_id,
                warning: outcome.error.map(|e| e.to_string()),
            })
            .map_err(|e| e.to_string())
    }

    async fn list(&self) -> std::result::Result<Vec<String>, String> {
        self.monitored_extensions().await.map_err(|e| e.to_string())
    }

    fn subscribe(&self, topic: &str) -> Option<broadcast::Receiver<Bytes>> {
        self.broker.subscribe(topic)
    }
}
