use crate::{Broker, BrokerError, Delivery, DeliveryStream, Result};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

type Message = Result<Delivery>;

/// An in-process [`Broker`] that acknowledges on delivery unless [`Broker::ack`] is called,
/// in which case it records the acknowledgement for inspection.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    closed: bool,
    next_id: u64,
    queues: HashMap<String, Queue>,
}

#[derive(Debug)]
struct Queue {
    sender: UnboundedSender<Message>,
    receiver: Option<UnboundedReceiver<Message>>,
    acknowledged: Vec<String>,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing the connection: open streams fail with
    /// [`BrokerError::ConnectionLost`] after draining what was already published, and every
    /// further call fails with [`BrokerError::ChannelClosed`].
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        for queue in state.queues.values() {
            let _ = queue
                .sender
                .send(Err(BrokerError::ConnectionLost("broker closed".to_owned())));
        }
    }

    /// Ids passed to [`Broker::ack`] for `queue`, in order.
    #[must_use]
    pub fn acknowledged(&self, queue: &str) -> Vec<String> {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|queue| queue.acknowledged.clone())
            .unwrap_or_default()
    }
}

impl State {
    fn open_queue(&mut self, name: &str) -> Result<&mut Queue> {
        if self.closed {
            return Err(BrokerError::ChannelClosed);
        }
        self.queues
            .get_mut(name)
            .ok_or_else(|| BrokerError::UnknownQueue(name.to_owned()))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrokerError::ChannelClosed);
        }

        state.queues.entry(queue.to_owned()).or_insert_with(|| {
            let (sender, receiver) = unbounded_channel();
            Queue {
                sender,
                receiver: Some(receiver),
                acknowledged: Vec::new(),
            }
        });
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id.to_string();

        let delivery = Delivery {
            id,
            payload: payload.to_vec(),
        };
        state
            .open_queue(queue)?
            .sender
            .send(Ok(delivery))
            .map_err(|_| BrokerError::ChannelClosed)
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        let receiver = self
            .state
            .lock()
            .open_queue(queue)?
            .receiver
            .take()
            .ok_or_else(|| BrokerError::AlreadyConsumed(queue.to_owned()))?;

        let deliveries = stream::unfold(Some(receiver), |receiver| async move {
            let mut receiver = receiver?;
            match receiver.recv().await? {
                Ok(delivery) => Some((Ok(delivery), Some(receiver))),
                Err(err) => Some((Err(err), None)),
            }
        });

        Ok(deliveries.boxed())
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        self.state
            .lock()
            .open_queue(queue)?
            .acknowledged
            .push(delivery.id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let broker = MemoryBroker::new();
        broker.declare_queue("posts").await.unwrap();
        broker.declare_queue("posts").await.unwrap();

        broker.publish("posts", b"one").await.unwrap();
        broker.publish("posts", b"two").await.unwrap();

        let mut deliveries = broker.consume("posts").await.unwrap();
        let one = deliveries.next().await.unwrap().unwrap();
        let two = deliveries.next().await.unwrap().unwrap();
        assert_eq!(one.payload, b"one");
        assert_eq!(two.payload, b"two");
        assert_ne!(one.id, two.id);
    }

    #[tokio::test]
    async fn undeclared_queues_are_rejected() {
        let broker = MemoryBroker::new();

        assert!(matches!(
            broker.publish("nowhere", b"x").await,
            Err(BrokerError::UnknownQueue(_))
        ));
        assert!(matches!(
            broker.consume("nowhere").await,
            Err(BrokerError::UnknownQueue(_))
        ));
    }

    #[tokio::test]
    async fn a_queue_has_one_consumer() {
        let broker = MemoryBroker::new();
        broker.declare_queue("posts").await.unwrap();

        let _deliveries = broker.consume("posts").await.unwrap();
        assert!(matches!(
            broker.consume("posts").await,
            Err(BrokerError::AlreadyConsumed(_))
        ));
    }

    #[tokio::test]
    async fn closing_ends_streams_with_connection_lost() {
        let broker = MemoryBroker::new();
        broker.declare_queue("posts").await.unwrap();
        let mut deliveries = broker.consume("posts").await.unwrap();
        broker.publish("posts", b"before").await.unwrap();

        broker.close();

        let before = deliveries.next().await.unwrap().unwrap();
        assert_eq!(before.payload, b"before");
        assert!(matches!(
            deliveries.next().await,
            Some(Err(BrokerError::ConnectionLost(_)))
        ));
        assert!(deliveries.next().await.is_none());

        assert!(matches!(
            broker.publish("posts", b"after").await,
            Err(BrokerError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn acknowledgements_are_recorded() {
        let broker = MemoryBroker::new();
        broker.declare_queue("posts").await.unwrap();
        broker.publish("posts", b"x").await.unwrap();

        let mut deliveries = broker.consume("posts").await.unwrap();
        let delivery = deliveries.next().await.unwrap().unwrap();
        broker.ack("posts", &delivery).await.unwrap();

        assert_eq!(broker.acknowledged("posts"), vec![delivery.id]);
    }
}
