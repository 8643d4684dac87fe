use std::sync::Arc;

use bytes::Bytes;

use super::Broker;
use crate::error::BrokerError;

/// Publishes event bodies, declaring the destination topic first.
#[derive(Clone)]
pub struct BrokerPublisher {
    broker: Arc<dyn Broker>,
}

impl BrokerPublisher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.broker.declare_topic(topic).await?;
        self.broker.publish(topic, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::FanoutBroker;

    #[tokio::test]
    async fn test_publish_declares_missing_topic() {
        let broker = Arc::new(FanoutBroker::new());
        let publisher = BrokerPublisher::new(broker.clone());
        assert!(broker.subscribe("csta.unrouted").is_none());

        publisher
            .publish("csta.unrouted", Bytes::from_static(b"{\"a\":1}"))
            .await
            .unwrap();

        assert!(broker.has_topic("csta.unrouted"));
        let mut events = broker.subscribe("csta.unrouted").unwrap();
        assert_eq!(events.recv().await.unwrap(), Bytes::from_static(b"{\"a\":1}"));
    }
}
