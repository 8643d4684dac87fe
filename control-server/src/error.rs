use std::net::SocketAddr;

/// Errors raised by the control server
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind control server to {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },
}
