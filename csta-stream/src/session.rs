//! Application session lifecycle.
//!
//! `NoSession → Active → Terminating → Closed`. While active, a background
//! heartbeat resets the provider's session timer every interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use csta_api::operations::{
    ResetApplicationSessionTimer, ResetApplicationSessionTimerRequest, StartApplicationSession,
    StartApplicationSessionRequest, StopApplicationSession, StopApplicationSessionRequest,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::request::RequestExecutor;
use crate::types::{ApplicationSession, SessionCredentials, SessionState};

/// InvokeRecord name for keep-alive requests.
const HEARTBEAT: &str = "heartbeat";

/// Owns the one application session of the engine.
pub struct SessionManager {
    executor: Arc<RequestExecutor>,
    config: Arc<EngineConfig>,
    state: RwLock<SessionState>,
    session: Arc<RwLock<Option<ApplicationSession>>>,
    heartbeat: Mutex<Option<Heartbeat>>,
    /// Serialises start against termination
    transition: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(executor: Arc<RequestExecutor>, config: Arc<EngineConfig>) -> Self {
        Self {
            executor,
            config,
            state: RwLock::new(SessionState::NoSession),
            session: Arc::new(RwLock::new(None)),
            heartbeat: Mutex::new(None),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// The open session, if any.
    pub fn session(&self) -> Option<ApplicationSession> {
        self.session.read().clone()
    }

    /// Open the application session and start the heartbeat.
    ///
    /// A failed or unparseable response leaves the manager in `NoSession`.
    pub async fn start(&self, credentials: &SessionCredentials) -> Result<ApplicationSession> {
        let _transition = self.transition.lock().await;
        match self.state() {
            SessionState::NoSession => {}
            SessionState::Active => return Err(EngineError::SessionAlreadyActive),
            SessionState::Terminating | SessionState::Closed => return Err(EngineError::ShuttingDown),
        }

        let request = StartApplicationSessionRequest {
            application_id: self.config.app_name.clone(),
            user: credentials.user.clone(),
            password: credentials.password.clone(),
            session_cleanup_delay: self.config.session_cleanup_delay,
            requested_session_duration: self.config.requested_session_duration,
        };
        let response = self
            .executor
            .execute::<StartApplicationSession>(&self.config.app_name, &request)
            .await?;

        let session = ApplicationSession {
            session_id: response.session_id,
            app_name: self.config.app_name.clone(),
            established_at: Utc::now(),
            last_refreshed_at: None,
            actual_duration: response.actual_session_duration,
            protocol_version: response.actual_protocol_version,
        };
        *self.session.write() = Some(session.clone());
        *self.state.write() = SessionState::Active;
        *self.heartbeat.lock() = Some(Heartbeat::start(
            self.executor.clone(),
            self.session.clone(),
            self.config.heartbeat_interval,
            self.config.requested_session_duration,
        ));

        tracing::info!(
            "Application session {} established for {}",
            session.session_id,
            session.app_name
        );
        Ok(session)
    }

    /// Enter `Terminating` and stop the heartbeat. The session stays open.
    pub async fn begin_termination(&self) {
        let _transition = self.transition.lock().await;
        {
            let mut state = self.state.write();
            if *state != SessionState::Closed {
                *state = SessionState::Terminating;
            }
        }
        self.stop_heartbeat().await;
    }

    /// Close the session.
    ///
    /// The local session record is discarded whatever the provider answers.
    /// Returns `None` when there was no session to stop, otherwise the
    /// outcome of the stop-session exchange.
    pub async fn stop(&self) -> Option<Result<()>> {
        let _transition = self.transition.lock().await;
        self.stop_heartbeat().await;

        let session = self.session.write().take();
        let outcome = match session {
            Some(session) => {
                let request = StopApplicationSessionRequest {
                    session_id: session.session_id.clone(),
                };
                let result = self
                    .executor
                    .execute_detached::<StopApplicationSession>(&self.config.app_name, &request)
                    .await;
                match &result {
                    Ok(()) => tracing::info!("Application session {} stopped", session.session_id),
                    Err(e) => tracing::warn!(
                        "Stopping application session {} failed: {}",
                        session.session_id,
                        e
                    ),
                }
                Some(result)
            }
            None => None,
        };

        *self.state.write() = SessionState::Closed;
        outcome
    }

    async fn stop_heartbeat(&self) {
        let heartbeat = self.heartbeat.lock().take();
        if let Some(heartbeat) = heartbeat {
            if let Err(e) = heartbeat.shutdown().await {
                tracing::warn!("{}", e);
            }
        }
    }
}

/// Background keep-alive task.
struct Heartbeat {
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl Heartbeat {
    /// Spawn the task. The first reset is sent one full period after start.
    fn start(
        executor: Arc<RequestExecutor>,
        session: Arc<RwLock<Option<ApplicationSession>>>,
        period: Duration,
        requested_duration: u32,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(Self::run(
            executor,
            session,
            period,
            requested_duration,
            shutdown_rx,
        ));
        Self {
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Signal the task and wait up to 5 seconds before aborting it.
    async fn shutdown(mut self) -> std::result::Result<(), String> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(()).await;
        }

        match self.task.take() {
            Some(mut task) => match timeout(Duration::from_secs(5), &mut task).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(format!("Heartbeat task panicked: {e}")),
                Err(_) => {
                    task.abort();
                    Err("Heartbeat task shutdown timed out after 5 seconds".to_string())
                }
            },
            None => Ok(()),
        }
    }

    async fn run(
        executor: Arc<RequestExecutor>,
        session: Arc<RwLock<Option<ApplicationSession>>>,
        period: Duration,
        requested_duration: u32,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut ticks = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    Self::refresh(&executor, &session, requested_duration).await;
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
        tracing::debug!("Heartbeat stopped");
    }

    /// Reset the session timer. Failures are logged; the next tick retries.
    async fn refresh(
        executor: &RequestExecutor,
        session: &RwLock<Option<ApplicationSession>>,
        requested_duration: u32,
    ) {
        let session_id = match session.read().as_ref() {
            Some(session) => session.session_id.clone(),
            None => return,
        };

        let request = ResetApplicationSessionTimerRequest {
            session_id: session_id.clone(),
            requested_session_duration: requested_duration,
        };
        match executor
            .execute::<ResetApplicationSessionTimer>(HEARTBEAT, &request)
            .await
        {
            Ok(response) => {
                if let Some(session) = session.write().as_mut() {
                    session.last_refreshed_at = Some(Utc::now());
                    if response.actual_session_duration.is_some() {
                        session.actual_duration = response.actual_session_duration;
                    }
                }
                tracing::debug!("Session {} timer reset", session_id);
            }
            Err(e) => tracing::warn!("Session {} keep-alive failed: {}", session_id, e),
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
