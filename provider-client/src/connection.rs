//! The single long-lived connection to the CSTA provider.
//!
//! One writer half guarded by a mutex (frames from concurrent callers must
//! never interleave) and one reader task that decodes frames and hands each
//! of them to a [`FrameHandler`] on its own task, so a slow handler never
//! stalls decoding of the next frame.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{ProviderError, Result};
use crate::frame::{encode_frame, read_frame, Frame};
use crate::invoke_id::InvokeId;

/// Receives every successfully decoded inbound frame.
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    async fn handle_frame(&self, frame: Frame);
}

/// Anything that can put a request frame on the wire.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, invoke_id: InvokeId, payload: &str) -> Result<()>;
}

/// Observable state of the provider connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected { reason: String },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Options for establishing the TCP connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Timeout for a single connect attempt
    /// Default: 15 seconds
    pub connect_timeout: Duration,
    /// Number of connect attempts before giving up
    /// Default: 5
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts
    /// Default: 2 seconds
    pub backoff_base: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            max_attempts: 5,
            backoff_base: Duration::from_secs(2),
        }
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Framed, multiplexed connection to the provider.
pub struct ProviderConnection {
    writer: Mutex<Option<BoxedWriter>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ProviderConnection {
    /// Connect over TCP, retrying with exponential backoff.
    ///
    /// - Attempt 1: immediate
    /// - Attempt 2: after `backoff_base`
    /// - Attempt 3: after `backoff_base * 2`, and so on
    pub async fn connect(
        host: &str,
        options: &ConnectOptions,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<Self> {
        let attempts = options.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            tracing::info!("Connecting to provider {} (attempt {}/{})", host, attempt, attempts);

            match tokio::time::timeout(options.connect_timeout, TcpStream::connect(host)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("Could not set TCP_NODELAY: {}", e);
                    }
                    tracing::info!("Connected to provider {}", host);
                    return Ok(Self::from_stream(stream, handler));
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!("timed out after {:?}", options.connect_timeout)
                }
            }

            tracing::warn!(
                "Failed to connect to provider {} (attempt {}/{}): {}",
                host,
                attempt,
                attempts,
                last_error
            );

            if attempt < attempts {
                let backoff = options.backoff_base * 2u32.pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }
        }

        Err(ProviderError::Connect {
            host: host.to_string(),
            reason: last_error,
        })
    }

    /// Wrap an already-open stream and start the reader task.
    pub fn from_stream<S>(stream: S, handler: Arc<dyn FrameHandler>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let status_tx = Arc::new(status_tx);

        let reader_task = tokio::spawn(Self::read_loop(reader, handler, status_tx.clone()));

        Self {
            writer: Mutex::new(Some(Box::new(writer))),
            status_tx,
            status_rx,
            reader_task: std::sync::Mutex::new(Some(reader_task)),
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to connection status changes.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Send one frame. Concurrent callers are serialised on the writer lock.
    pub async fn send_frame(&self, invoke_id: InvokeId, payload: &str) -> Result<()> {
        let frame = encode_frame(invoke_id, payload)?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ProviderError::NotConnected)?;

        tracing::debug!(invoke_id = %invoke_id, "REQUEST {}", payload);

        let result = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(invoke_id = %invoke_id, "Failed to write frame: {}", e);
            self.mark_disconnected(format!("write failed: {e}"));
            return Err(ProviderError::Io(e));
        }

        Ok(())
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        let writer = self.writer.lock().await.take();

        let reader_task = self
            .reader_task
            .lock()
            .map(|mut task| task.take())
            .unwrap_or(None);
        if let Some(task) = reader_task {
            task.abort();
        }

        self.mark_disconnected("closed locally".to_string());

        match writer {
            Some(mut writer) => {
                tracing::info!("Closing provider connection");
                writer.shutdown().await.map_err(ProviderError::Io)
            }
            None => Ok(()),
        }
    }

    fn mark_disconnected(&self, reason: String) {
        self.status_tx.send_if_modified(|status| {
            if status.is_connected() {
                *status = ConnectionStatus::Disconnected { reason };
                true
            } else {
                false
            }
        });
    }

    async fn read_loop<R>(
        mut reader: R,
        handler: Arc<dyn FrameHandler>,
        status_tx: Arc<watch::Sender<ConnectionStatus>>,
    ) where
        R: AsyncRead + Unpin,
    {
        loop {
            match read_frame(&mut reader).await {
                Ok(frame) => {
                    tracing::debug!(
                        invoke_id = %frame.invoke_id,
                        length = frame.payload.len(),
                        "RESPONSE {}",
                        frame.payload
                    );
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        handler.handle_frame(frame).await;
                    });
                }
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Discarding malformed frame: {}", e);
                }
                Err(e) => {
                    tracing::error!("Provider connection lost: {}", e);
                    status_tx.send_if_modified(|status| {
                        if status.is_connected() {
                            *status = ConnectionStatus::Disconnected {
                                reason: e.to_string(),
                            };
                            true
                        } else {
                            false
                        }
                    });
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl FrameSink for ProviderConnection {
    async fn send(&self, invoke_id: InvokeId, payload: &str) -> Result<()> {
        self.send_frame(invoke_id, payload).await
    }
}

impl Drop for ProviderConnection {
    fn drop(&mut self) {
        if let Ok(mut task) = self.reader_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}
