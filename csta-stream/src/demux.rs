//! Inbound frame demultiplexing.
//!
//! Frames tagged with the unsolicited sentinel are events: they are turned
//! into JSON and published to the topic of the extension their monitor
//! belongs to. Every other frame answers a request and is deposited in the
//! store for the correlator waiting on its invoke id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use correlation_store::{keys, CorrelationStore};
use csta_api::event::{flatten, monitor_cross_ref_id, xml_to_json};
use provider_client::{Frame, FrameHandler, InvokeId};

use crate::broker::{Broker, BrokerPublisher};
use crate::config::EngineConfig;
use crate::error::Result;

/// Routes decoded frames to the store or the broker.
pub struct EventDemultiplexer {
    store: Arc<dyn CorrelationStore>,
    publisher: BrokerPublisher,
    app_name: String,
    response_ttl: Duration,
    unrouted_topic: String,
}

impl EventDemultiplexer {
    pub fn new(config: &EngineConfig, store: Arc<dyn CorrelationStore>, broker: Arc<dyn Broker>) -> Self {
        Self {
            store,
            publisher: BrokerPublisher::new(broker),
            app_name: config.app_name.clone(),
            response_ttl: config.response_ttl,
            unrouted_topic: config.unrouted_topic.clone(),
        }
    }

    /// Handle one frame, by invoke id.
    pub async fn dispatch(&self, frame: Frame) -> Result<()> {
        if frame.invoke_id.is_unsolicited() {
            self.route_event(&frame.payload).await.map(|_| ())
        } else {
            self.deposit_response(frame.invoke_id, &frame.payload).await
        }
    }

    /// Store the answer to a request as its ResponseRecord.
    pub async fn deposit_response(&self, invoke_id: InvokeId, payload: &str) -> Result<()> {
        self.store
            .set_ex(
                &keys::response_key(invoke_id, &self.app_name),
                payload,
                self.response_ttl,
            )
            .await?;
        Ok(())
    }

    /// Publish an unsolicited event. Returns the topic it was published to.
    ///
    /// Events whose monitor cross-reference is missing or unknown go to the
    /// unrouted topic.
    pub async fn route_event(&self, payload: &str) -> Result<String> {
        let document = xml_to_json(payload)?;
        let flat = flatten(&document);

        let topic = match monitor_cross_ref_id(&flat) {
            Some(cross_ref) => {
                let key = keys::cross_ref_key(cross_ref, &self.app_name);
                match self.store.get(&key).await? {
                    Some(extension) => extension,
                    None => {
                        tracing::warn!(
                            "Event for unknown monitorCrossRefID {} routed to {}",
                            cross_ref,
                            self.unrouted_topic
                        );
                        self.unrouted_topic.clone()
                    }
                }
            }
            None => {
                tracing::warn!("Event without monitorCrossRefID routed to {}", self.unrouted_topic);
                self.unrouted_topic.clone()
            }
        };

        self.publisher
            .publish(&topic, Bytes::from(document.to_string()))
            .await?;
        tracing::debug!("Published event to {}", topic);
        Ok(topic)
    }
}

#[async_trait]
impl FrameHandler for EventDemultiplexer {
    async fn handle_frame(&self, frame: Frame) {
        let invoke_id = frame.invoke_id;
        if let Err(e) = self.dispatch(frame).await {
            tracing::warn!(invoke_id = %invoke_id, "Failed to handle inbound frame: {}", e);
        }
    }
}
