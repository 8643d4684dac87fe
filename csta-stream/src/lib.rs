//! CSTA provider protocol engine
//!
//! Requests and responses share one multiplexed provider connection but are
//! handled by independent tasks. They meet in a shared store: the caller
//! allocates an invoke id, sends its request and polls the store; the
//! connection reader deposits each answer under its invoke id. Unsolicited
//! events, tagged with the reserved id `9999`, are published to a broker
//! topic named after the monitored extension.
//!
//! # Components
//!
//! - [`InvokeAllocator`]: store-backed 4 digit invoke ids
//! - [`ResponseCorrelator`]: bounded, cancellable wait for a response
//! - [`RequestExecutor`]: typed request/response exchanges
//! - [`EventDemultiplexer`]: routes inbound frames to the store or the broker
//! - [`Broker`], [`FanoutBroker`], [`AmqpBroker`], [`BrokerPublisher`]: event fan-out
//! - [`SessionManager`]: application session and heartbeat
//! - [`MonitoringManager`]: per-extension monitor lifecycle
//! - [`Engine`]: wires everything together and runs the ordered teardown

pub mod broker;
pub mod config;
pub mod correlator;
pub mod demux;
pub mod engine;
pub mod error;
pub mod invoke;
pub mod monitoring;
pub mod request;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use broker::{AmqpBroker, Broker, BrokerPublisher, FanoutBroker};
pub use config::EngineConfig;
pub use correlator::ResponseCorrelator;
pub use demux::EventDemultiplexer;
pub use engine::Engine;
pub use error::{BrokerError, EngineError, Result};
pub use invoke::InvokeAllocator;
pub use monitoring::MonitoringManager;
pub use request::RequestExecutor;
pub use session::SessionManager;
pub use types::{
    ApplicationSession, ExtensionRecord, MonitorState, MonitorTarget, SessionCredentials,
    SessionState, StopOutcome, TeardownReport,
};
