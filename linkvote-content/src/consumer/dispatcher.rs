use crate::consumer::handlers::HandlerError;
use async_trait::async_trait;
use futures::StreamExt;
use linkvote_broker::{Broker, BrokerError, Delivery, DeliveryStream};
use linkvote_common::model::event::{Envelope, EventKind};
use serde::de::DeserializeOwned;
use std::{collections::HashMap, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handles one kind of event after it has been routed by its `type`.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    type Event: DeserializeOwned + Send;

    async fn handle(&self, event: Self::Event) -> Result<(), HandlerError>;
}

#[async_trait]
trait PayloadHandler: Send + Sync {
    async fn handle_payload(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: EventHandler> PayloadHandler for H {
    async fn handle_payload(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let event = serde_json::from_slice(payload)?;
        self.handle(event).await
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn PayloadHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `kind` to `handler`, replacing any earlier registration for it.
    #[must_use]
    pub fn with<H: EventHandler>(mut self, kind: EventKind, handler: Arc<H>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    fn get(&self, kind: EventKind) -> Option<&Arc<dyn PayloadHandler>> {
        self.handlers.get(&kind)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Outcome {
    Handled(EventKind),
    /// Not a JSON object with a string `type`.
    Malformed,
    /// A `type` nothing is registered for.
    Unroutable(String),
    Failed { kind: EventKind, retryable: bool },
}

impl Outcome {
    /// Whether the message is finished with. Only retryable failures are left for redelivery.
    #[must_use]
    pub fn should_ack(&self) -> bool {
        !matches!(
            self,
            Outcome::Failed {
                retryable: true,
                ..
            }
        )
    }
}

pub struct Dispatcher {
    registry: HandlerRegistry,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Routes one raw message to its handler. Never fails: every problem is logged and reported
    /// as the [`Outcome`].
    pub async fn dispatch(&self, payload: &[u8]) -> Outcome {
        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(error = %err, "Dropping malformed message");
                return Outcome::Malformed;
            }
        };

        let Some((kind, handler)) = envelope
            .event_kind()
            .ok()
            .and_then(|kind| Some((kind, self.registry.get(kind)?)))
        else {
            warn!(event_type = %envelope.kind, "Dropping message with unknown event type");
            return Outcome::Unroutable(envelope.kind);
        };

        match handler.handle_payload(payload).await {
            Ok(()) => {
                debug!(event_type = %kind, "Handled event");
                Outcome::Handled(kind)
            }
            Err(err) => {
                let retryable = err.is_retryable();
                error!(error = %err, event_type = %kind, retryable, "Handling event failed");
                Outcome::Failed { kind, retryable }
            }
        }
    }

    /// Handles deliveries one at a time, in order, until the stream fails or `shutdown` is
    /// cancelled. A message that is already being handled is finished before returning.
    ///
    /// Returns `Ok(())` only on shutdown.
    pub async fn run(
        &self,
        broker: &dyn Broker,
        queue: &str,
        mut deliveries: DeliveryStream,
        shutdown: &CancellationToken,
    ) -> Result<(), BrokerError> {
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!(queue, "Stopped consuming");
                    return Ok(());
                }
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(BrokerError::ConnectionLost(
                        "delivery stream ended".to_owned(),
                    ));
                }
            };

            self.process(broker, queue, &delivery).await;
        }
    }

    async fn process(&self, broker: &dyn Broker, queue: &str, delivery: &Delivery) {
        let outcome = self.dispatch(&delivery.payload).await;

        if !outcome.should_ack() {
            debug!(queue, delivery_id = %delivery.id, "Leaving message for redelivery");
            return;
        }

        if let Err(err) = broker.ack(queue, delivery).await {
            warn!(error = %err, queue, delivery_id = %delivery.id, "Acknowledging message failed");
        }
    }
}
