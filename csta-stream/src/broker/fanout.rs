use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::Broker;
use crate::error::BrokerError;

/// Messages buffered per topic for slow subscribers.
const TOPIC_CAPACITY: usize = 1024;

struct Topic {
    sender: broadcast::Sender<Bytes>,
    /// Receiver opened at declaration. Handed to the first subscriber so it
    /// sees everything published since, up to `TOPIC_CAPACITY` messages.
    parked: Mutex<Option<broadcast::Receiver<Bytes>>>,
}

impl Topic {
    fn new() -> Self {
        let (sender, parked) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            sender,
            parked: Mutex::new(Some(parked)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.parked.lock().take().unwrap_or_else(|| self.sender.subscribe())
    }
}

/// In-process broker: every topic is a `broadcast` channel.
///
/// Topics are durable the way a declared queue is: messages published before
/// anyone subscribes are retained for the first subscriber. Only declared
/// topics can be published to or subscribed to.
pub struct FanoutBroker {
    topics: DashMap<String, Topic>,
    closed: AtomicBool,
}

impl FanoutBroker {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Names of the declared topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().map(|entry| entry.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for FanoutBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for FanoutBroker {
    async fn declare_topic(&self, topic: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        if let dashmap::mapref::entry::Entry::Vacant(entry) = self.topics.entry(topic.to_string()) {
            entry.insert(Topic::new());
            tracing::debug!("Declared topic {}", topic);
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let sender = self
            .topics
            .get(topic)
            .map(|entry| entry.value().sender.clone())
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))?;

        // Err only means nobody is subscribed
        let receivers = sender.send(payload).unwrap_or(0);
        tracing::trace!("Published to {} ({} receivers)", topic, receivers);
        Ok(())
    }

    async fn delete_topic(&self, topic: &str) -> Result<bool, BrokerError> {
        self.ensure_open()?;
        let existed = self.topics.remove(topic).is_some();
        if existed {
            tracing::debug!("Deleted topic {}", topic);
        }
        Ok(existed)
    }

    fn subscribe(&self, topic: &str) -> Option<broadcast::Receiver<Bytes>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.topics.get(topic).map(|entry| entry.value().subscribe())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.topics.clear();
        tracing::info!("Broker closed");
        Ok(())
    }
}
