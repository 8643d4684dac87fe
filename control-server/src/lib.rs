//! HTTP control surface for the CSTA bridge.
//!
//! A thin layer over a [`MonitoringControl`] implementation:
//!
//! - `GET /start/{type}/{extension}` starts monitoring (`type` is VDN or SKILL)
//! - `GET /stop/{extension}` stops it
//! - `GET /getall` lists monitored extensions, one per line
//! - `GET /events/{topic}` streams the events published to a topic as
//!   server-sent events
//!
//! Failures are answered with status 400 and the error text as body.

mod control;
mod error;
mod routes;
mod server;

pub use control::{MonitoringControl, StartedMonitor, StoppedMonitor};
pub use error::ServerError;
pub use routes::routes;
pub use server::ControlServer;
