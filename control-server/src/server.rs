use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::control::MonitoringControl;
use crate::error::ServerError;
use crate::routes::routes;

/// HTTP server exposing a [`MonitoringControl`].
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use control_server::{ControlServer, MonitoringControl};
/// # async fn run(control: Arc<dyn MonitoringControl>) {
/// let server = ControlServer::bind("0.0.0.0:7700".parse().unwrap(), control)
///     .await
///     .unwrap();
/// println!("listening on {}", server.local_addr());
/// server.shutdown().await.unwrap();
/// # }
/// ```
pub struct ControlServer {
    /// The address the server is bound to
    local_addr: SocketAddr,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<JoinHandle<()>>,
}

impl ControlServer {
    /// Bind and start serving. Port 0 picks a free port.
    pub async fn bind(
        addr: SocketAddr,
        control: Arc<dyn MonitoringControl>,
    ) -> Result<Self, ServerError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let (local_addr, server) = warp::serve(routes(control))
            .try_bind_with_graceful_shutdown(addr, async move {
                shutdown_rx.recv().await;
            })
            .map_err(|e| ServerError::Bind {
                addr,
                reason: e.to_string(),
            })?;

        tracing::info!("Control server listening on {}", local_addr);
        let server_handle = tokio::spawn(server);

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL for requests against this server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(mut self) -> Result<(), String> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| format!("Control server task failed: {}", e))?;
        }

        tracing::info!("Control server stopped");
        Ok(())
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}
