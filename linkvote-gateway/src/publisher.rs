use linkvote_broker::{Broker, BrokerError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Event could not be serialized: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Sends wire events to the content service's queue.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    queue: String,
}

impl EventPublisher {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, queue: String) -> Self {
        Self { broker, queue }
    }

    pub async fn publish<E: Serialize + Sync>(&self, event: &E) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.broker.publish(&self.queue, &payload).await?;

        debug!(queue = %self.queue, "Published event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use linkvote_broker::MemoryBroker;
    use linkvote_common::model::event::VoteEvent;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn publishes_json_to_its_queue() {
        let broker = Arc::new(MemoryBroker::new());
        broker.declare_queue("events").await.unwrap();
        let publisher =
            EventPublisher::new(Arc::clone(&broker) as Arc<dyn Broker>, "events".to_owned());

        publisher
            .publish(&VoteEvent {
                kind: "upvote".to_owned(),
                post_uuid: "p1".to_owned(),
                voter_uuid: "u1".to_owned(),
            })
            .await
            .unwrap();

        let mut deliveries = broker.consume("events").await.unwrap();
        let delivery = deliveries.next().await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&delivery.payload).unwrap(),
            json!({"type": "upvote", "post_uuid": "p1", "voter_uuid": "u1"})
        );
    }

    #[tokio::test]
    async fn broker_failures_surface() {
        let broker = Arc::new(MemoryBroker::new());
        let publisher = EventPublisher::new(broker, "undeclared".to_owned());

        assert!(matches!(
            publisher.publish(&json!({})).await,
            Err(PublishError::Broker(BrokerError::UnknownQueue(_)))
        ));
    }
}
