//! Process wiring: engine, control server, signals and teardown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use control_server::{ControlServer, MonitoringControl};
use correlation_store::{CorrelationStore, MemoryStore, RedisStore};
use csta_stream::{AmqpBroker, Broker, Engine, FanoutBroker, TeardownReport};
use provider_client::ConnectionStatus;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{BrokerBackend, Config, StoreBackend};

/// Why the bridge stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// SIGINT, SIGTERM or the caller's shutdown future
    Signal,
    /// The provider connection dropped
    ConnectionLost(String),
}

impl Exit {
    pub fn is_failure(&self) -> bool {
        matches!(self, Exit::ConnectionLost(_))
    }
}

/// A running bridge: open session, initial monitors, HTTP surface.
pub struct Bridge {
    engine: Arc<Engine>,
    server: ControlServer,
    initial: JoinHandle<()>,
}

impl Bridge {
    /// Connect, open the session, start the configured monitors in the
    /// background and serve the control surface.
    ///
    /// A failed session start is fatal: whatever was opened is released
    /// before the error is returned.
    pub async fn start(config: &Config) -> Result<Self> {
        let attempts = config.connect.max_attempts;
        let store = open_store(&config.store, attempts).await?;
        let broker = match open_broker(&config.broker, attempts).await {
            Ok(broker) => broker,
            Err(e) => {
                if let Err(close) = store.close().await {
                    warn!("Store close failed: {}", close);
                }
                return Err(e);
            }
        };

        let engine = Engine::connect(
            config.engine.clone(),
            &config.provider_host,
            &config.connect,
            store,
            broker,
        )
        .await
        .with_context(|| format!("Failed to connect to provider {}", config.provider_host))?;
        let engine = Arc::new(engine);

        if let Err(e) = engine.start_session(&config.credentials).await {
            error!("Failed to start application session: {}", e);
            log_report(&engine.shutdown().await);
            return Err(anyhow::Error::new(e).context("Failed to start application session"));
        }

        let initial = {
            let engine = engine.clone();
            let targets = config.targets.clone();
            tokio::spawn(async move {
                engine.monitor_initial(&targets).await;
            })
        };

        let control: Arc<dyn MonitoringControl> = engine.clone();
        let server = match ControlServer::bind(config.http_addr, control).await {
            Ok(server) => server,
            Err(e) => {
                error!("Failed to start control server: {}", e);
                log_report(&engine.shutdown().await);
                initial.abort();
                return Err(anyhow::Error::new(e).context("Failed to start control server"));
            }
        };

        Ok(Self {
            engine,
            server,
            initial,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Address the control surface is bound to.
    pub fn http_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Run until `shutdown` completes or the provider connection drops,
    /// then stop the control surface and tear the engine down.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(Exit, TeardownReport)>
    where
        F: Future<Output = ()>,
    {
        let mut status = self.engine.connection_status();

        let exit = tokio::select! {
            _ = shutdown => Exit::Signal,
            lost = status.wait_for(|status| !status.is_connected()) => {
                let reason = match lost.as_deref() {
                    Ok(ConnectionStatus::Disconnected { reason }) => reason.clone(),
                    Ok(ConnectionStatus::Connected) | Err(_) => {
                        "connection status unavailable".to_string()
                    }
                };
                error!("Provider connection lost: {}", reason);
                Exit::ConnectionLost(reason)
            }
        };

        info!("Stopping control server");
        if let Err(e) = self.server.shutdown().await {
            warn!("Control server did not stop cleanly: {}", e);
        }

        let report = self.engine.shutdown().await;
        log_report(&report);

        if let Err(e) = self.initial.await {
            if !e.is_cancelled() {
                warn!("Initial monitoring task failed: {}", e);
            }
        }

        Ok((exit, report))
    }
}

/// Run the bridge until SIGINT, SIGTERM or loss of the provider connection.
pub async fn run(config: Config) -> Result<Exit> {
    let bridge = Bridge::start(&config).await?;
    info!(
        "Bridge {} running, control surface on {}",
        config.engine.app_name,
        bridge.http_addr()
    );

    let (exit, _report) = bridge.run_until(shutdown_signal()).await?;
    Ok(exit)
}

async fn open_store(backend: &StoreBackend, attempts: u32) -> Result<Arc<dyn CorrelationStore>> {
    let store: Arc<dyn CorrelationStore> = match backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Redis(url) => Arc::new(
            RedisStore::connect(url, attempts)
                .await
                .with_context(|| format!("Failed to connect to store {}", backend))?,
        ),
    };
    info!("Store ready: {}", backend);
    Ok(store)
}

async fn open_broker(backend: &BrokerBackend, attempts: u32) -> Result<Arc<dyn Broker>> {
    let broker: Arc<dyn Broker> = match backend {
        BrokerBackend::Memory => Arc::new(FanoutBroker::new()),
        BrokerBackend::Amqp(url) => Arc::new(
            AmqpBroker::connect(url, attempts)
                .await
                .with_context(|| format!("Failed to connect to broker {}", backend))?,
        ),
    };
    info!("Broker ready: {}", backend);
    Ok(broker)
}

fn log_report(report: &TeardownReport) {
    if report.is_clean() {
        info!(
            "Teardown complete: {} monitors stopped, session stop sent: {}",
            report.stopped.len(),
            report.session_stop_sent
        );
        return;
    }

    for (extension, reason) in &report.failed {
        warn!("Monitor {} was not stopped cleanly: {}", extension, reason);
    }
    if let Some(reason) = &report.session_stop_error {
        warn!("Session stop failed: {}", reason);
    }
    for reason in &report.release_errors {
        warn!("Release failed: {}", reason);
    }
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
