//! Downstream event broker.
//!
//! - [`Broker`]: the topic operations the engine depends on
//! - [`FanoutBroker`]: in-process backend, one broadcast channel per topic
//! - [`AmqpBroker`]: fanout exchanges on an AMQP 0.9.1 server
//! - [`BrokerPublisher`]: declare-then-publish used by the demultiplexer

mod amqp;
mod fanout;
mod publisher;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::error::BrokerError;

pub use amqp::AmqpBroker;
pub use fanout::FanoutBroker;
pub use publisher::BrokerPublisher;

/// A fan-out message broker with named durable topics.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a topic. Declaring an existing topic is a no-op.
    async fn declare_topic(&self, topic: &str) -> Result<(), BrokerError>;

    /// Publish one message. No delivery confirmation is awaited.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Delete a topic. Returns whether it existed.
    async fn delete_topic(&self, topic: &str) -> Result<bool, BrokerError>;

    /// Attach a consumer to a declared topic. `None` when the topic was never
    /// declared or the backend cannot feed in-process consumers.
    fn subscribe(&self, _topic: &str) -> Option<broadcast::Receiver<Bytes>> {
        None
    }

    /// Release the broker connection.
    async fn close(&self) -> Result<(), BrokerError>;
}
