use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, ExchangeDeleteOptions,
    QueueBindOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::Broker;
use crate::error::BrokerError;

/// Pause between connection attempts.
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Messages buffered per in-process feed.
const FEED_CAPACITY: usize = 1024;

/// Reply code for a normal channel or connection close.
const REPLY_SUCCESS: u16 = 200;

/// An in-process consumer attached to a topic's exchange.
struct Feed {
    sender: broadcast::Sender<Bytes>,
    task: JoinHandle<()>,
}

/// Broker backed by an AMQP 0.9.1 server such as RabbitMQ.
///
/// Each topic is a durable fanout exchange with a durable queue of the same
/// name bound to it, so events published while no consumer is attached are
/// kept for the downstream service. In-process subscribers get their own
/// exclusive queue and never drain the durable one.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    declared: DashSet<String>,
    feeds: DashMap<String, Feed>,
    closed: AtomicBool,
}

impl AmqpBroker {
    /// Connect to `url`, retrying up to `attempts` times.
    pub async fn connect(url: &str, attempts: u32) -> Result<Self, BrokerError> {
        let attempts = attempts.max(1);
        let mut attempt = 0;
        let connection = loop {
            attempt += 1;
            match Connection::connect(url, ConnectionProperties::default()).await {
                Ok(connection) => break connection,
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "Broker connection attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => return Err(unavailable(e)),
            }
        };

        let channel = connection.create_channel().await.map_err(unavailable)?;
        tracing::info!("Connected to broker after {} attempt(s)", attempt);

        Ok(Self {
            connection,
            channel,
            declared: DashSet::new(),
            feeds: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) || !self.connection.status().connected() {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }

    fn drop_feed(&self, topic: &str) {
        if let Some((_, feed)) = self.feeds.remove(topic) {
            feed.task.abort();
        }
    }

    fn open_feed(&self, topic: &str) -> Option<broadcast::Receiver<Bytes>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let (sender, receiver) = broadcast::channel(FEED_CAPACITY);
        let task = runtime.spawn(consume(self.channel.clone(), topic.to_string(), sender.clone()));
        self.feeds.insert(topic.to_string(), Feed { sender, task });
        Some(receiver)
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_topic(&self, topic: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        if self.declared.contains(topic) {
            return Ok(());
        }

        let durable = ExchangeDeclareOptions {
            durable: true,
            ..ExchangeDeclareOptions::default()
        };
        self.channel
            .exchange_declare(topic, ExchangeKind::Fanout, durable, FieldTable::default())
            .await
            .map_err(unavailable)?;

        let queue = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(topic, queue, FieldTable::default())
            .await
            .map_err(unavailable)?;
        self.channel
            .queue_bind(topic, topic, "", QueueBindOptions::default(), FieldTable::default())
            .await
            .map_err(unavailable)?;

        self.declared.insert(topic.to_string());
        tracing::debug!("Declared topic {}", topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.ensure_open()?;
        if !self.declared.contains(topic) {
            return Err(BrokerError::TopicNotFound(topic.to_string()));
        }

        self.channel
            .basic_publish(
                topic,
                "",
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(unavailable)?;
        tracing::trace!("Published {} bytes to {}", payload.len(), topic);
        Ok(())
    }

    /// Delete the topic's queue and exchange. Reports whether this broker had
    /// declared the topic; the server-side delete is attempted either way.
    async fn delete_topic(&self, topic: &str) -> Result<bool, BrokerError> {
        self.ensure_open()?;
        self.drop_feed(topic);

        self.channel
            .queue_delete(topic, QueueDeleteOptions::default())
            .await
            .map_err(unavailable)?;
        self.channel
            .exchange_delete(topic, ExchangeDeleteOptions::default())
            .await
            .map_err(unavailable)?;

        let existed = self.declared.remove(topic).is_some();
        tracing::debug!("Deleted topic {}", topic);
        Ok(existed)
    }

    fn subscribe(&self, topic: &str) -> Option<broadcast::Receiver<Bytes>> {
        if self.ensure_open().is_err() || !self.declared.contains(topic) {
            return None;
        }
        if let Some(feed) = self.feeds.get(topic) {
            if !feed.task.is_finished() {
                return Some(feed.sender.subscribe());
            }
        }
        self.open_feed(topic)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let topics: Vec<String> = self.feeds.iter().map(|feed| feed.key().clone()).collect();
        for topic in topics {
            self.drop_feed(&topic);
        }
        self.declared.clear();

        if let Err(e) = self.channel.close(REPLY_SUCCESS, "bye").await {
            tracing::debug!("Broker channel close failed: {}", e);
        }
        self.connection
            .close(REPLY_SUCCESS, "bye")
            .await
            .map_err(unavailable)?;
        tracing::info!("Broker closed");
        Ok(())
    }
}

/// Bind an exclusive server-named queue to `topic` and forward every
/// delivery into `sender` until the consumer ends.
async fn consume(channel: Channel, topic: String, sender: broadcast::Sender<Bytes>) {
    let exclusive = QueueDeclareOptions {
        exclusive: true,
        auto_delete: true,
        ..QueueDeclareOptions::default()
    };
    let queue = match channel.queue_declare("", exclusive, FieldTable::default()).await {
        Ok(queue) => queue,
        Err(e) => {
            tracing::warn!("Failed to open feed queue for {}: {}", topic, e);
            return;
        }
    };
    let queue_name = queue.name().as_str().to_string();

    if let Err(e) = channel
        .queue_bind(&queue_name, &topic, "", QueueBindOptions::default(), FieldTable::default())
        .await
    {
        tracing::warn!("Failed to bind feed queue for {}: {}", topic, e);
        return;
    }

    let no_ack = BasicConsumeOptions {
        no_ack: true,
        ..BasicConsumeOptions::default()
    };
    let mut consumer = match channel
        .basic_consume(&queue_name, "", no_ack, FieldTable::default())
        .await
    {
        Ok(consumer) => consumer,
        Err(e) => {
            tracing::warn!("Failed to consume feed for {}: {}", topic, e);
            return;
        }
    };

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                // Err only means nobody is listening right now
                let _ = sender.send(Bytes::from(delivery.data));
            }
            Err(e) => {
                tracing::warn!("Feed for {} ended: {}", topic, e);
                break;
            }
        }
    }
    tracing::debug!("Feed for {} closed", topic);
}

fn unavailable(error: lapin::Error) -> BrokerError {
    BrokerError::Other(error.to_string())
}
