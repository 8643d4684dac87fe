//! CSTA bridge service
//!
//! Connects to the CSTA provider, opens an application session, monitors
//! the configured extensions and serves the HTTP control surface until
//! SIGINT, SIGTERM or loss of the provider connection, then tears
//! everything down in order.

pub mod app;
pub mod config;
pub mod logging;

pub use app::{run, Bridge, Exit};
pub use config::{Args, BrokerBackend, Config, StoreBackend};
