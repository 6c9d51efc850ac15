use crate::consumer::dispatcher::Dispatcher;
use linkvote_broker::{Broker, BrokerError};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Keeps a [`Dispatcher`] subscribed to its queue for the lifetime of the process.
///
/// `ready` is `true` exactly while a subscription is live.
pub struct ConsumerSupervisor {
    queue: String,
    dispatcher: Dispatcher,
    ready: watch::Sender<bool>,
    shutdown: CancellationToken,
    resubscribe_delay: Duration,
}

impl ConsumerSupervisor {
    #[must_use]
    pub fn new(
        queue: String,
        dispatcher: Dispatcher,
        ready: watch::Sender<bool>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            ready,
            shutdown,
            resubscribe_delay: RESUBSCRIBE_DELAY,
        }
    }

    #[must_use]
    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Connects with `connect`, consumes until the connection is lost, and starts over.
    ///
    /// `connect` is expected to do its own bounded retrying. If it fails anyway, shutdown is
    /// requested for the whole process and its error is returned.
    pub async fn run<C, Fut>(self, mut connect: C) -> Result<(), BrokerError>
    where
        C: FnMut() -> Fut,
        Fut: Future<Output = Result<Arc<dyn Broker>, BrokerError>>,
    {
        let result = loop {
            let connected = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break Ok(()),
                connected = connect() => connected,
            };

            let broker = match connected {
                Ok(broker) => broker,
                Err(err) => {
                    error!(error = %err, queue = %self.queue, "Could not reach the broker, shutting down");
                    self.shutdown.cancel();
                    break Err(err);
                }
            };

            match self.consume(broker.as_ref()).await {
                Ok(()) => break Ok(()),
                Err(err) => {
                    self.ready.send_replace(false);
                    warn!(
                        error = %err,
                        queue = %self.queue,
                        delay = ?self.resubscribe_delay,
                        "Consumer disconnected, resubscribing"
                    );
                }
            }

            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break Ok(()),
                () = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        };

        self.ready.send_replace(false);
        result
    }

    async fn consume(&self, broker: &dyn Broker) -> Result<(), BrokerError> {
        broker.declare_queue(&self.queue).await?;
        let deliveries = broker.consume(&self.queue).await?;

        self.ready.send_replace(true);
        info!(queue = %self.queue, "Consumer ready");

        self.dispatcher
            .run(broker, &self.queue, deliveries, &self.shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::handlers;
    use linkvote_broker::MemoryBroker;
    use linkvote_db::{ContentStore, MemoryStore};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    const QUEUE: &str = "posts";
    const LINK: &[u8] = br#"{"type":"link","creator_uuid":"u1","title":"t","url":"x"}"#;

    async fn declared() -> Arc<MemoryBroker> {
        let broker = Arc::new(MemoryBroker::new());
        broker.declare_queue(QUEUE).await.unwrap();
        broker
    }

    async fn wait_for_posts(store: &Arc<dyn ContentStore>, count: usize) {
        while store.fetch_posts(0, 100).await.unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn resubscribes_after_losing_the_broker() {
        let first = declared().await;
        let second = declared().await;
        let brokers = Mutex::new(VecDeque::from([Arc::clone(&first), Arc::clone(&second)]));

        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let (ready_tx, mut ready_rx) = watch::channel(false);
        let shutdown = CancellationToken::new();
        let supervisor = ConsumerSupervisor::new(
            QUEUE.to_owned(),
            Dispatcher::new(handlers::registry(&store)),
            ready_tx,
            shutdown.clone(),
        )
        .with_resubscribe_delay(Duration::from_millis(10));

        let run = supervisor.run(|| {
            let next = brokers.lock().pop_front();
            async move {
                next.map(|broker| broker as Arc<dyn Broker>)
                    .ok_or(BrokerError::ChannelClosed)
            }
        });
        let drive = async {
            ready_rx.wait_for(|ready| *ready).await.unwrap();
            first.publish(QUEUE, LINK).await.unwrap();
            wait_for_posts(&store, 1).await;

            first.close();
            second.publish(QUEUE, LINK).await.unwrap();
            wait_for_posts(&store, 2).await;
            assert!(*ready_rx.borrow());

            shutdown.cancel();
        };

        let (result, ()) = tokio::join!(run, drive);
        result.unwrap();

        assert!(!*ready_rx.borrow());
        assert!(brokers.lock().is_empty());
    }

    #[tokio::test]
    async fn failing_to_connect_shuts_the_process_down() {
        let (ready_tx, ready_rx) = watch::channel(false);
        let shutdown = CancellationToken::new();
        let supervisor = ConsumerSupervisor::new(
            QUEUE.to_owned(),
            Dispatcher::new(handlers::registry(&(
                Arc::new(MemoryStore::new()) as Arc<dyn ContentStore>
            ))),
            ready_tx,
            shutdown.clone(),
        );

        let result = supervisor
            .run(|| async {
                Err::<Arc<dyn Broker>, _>(BrokerError::RetriesExhausted {
                    attempts: 5,
                    last: Box::new(BrokerError::ChannelClosed),
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(BrokerError::RetriesExhausted { attempts: 5, .. })
        ));
        assert!(shutdown.is_cancelled());
        assert!(!*ready_rx.borrow());
    }

    #[tokio::test]
    async fn stops_on_shutdown_without_connecting() {
        let (ready_tx, _ready_rx) = watch::channel(false);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let supervisor = ConsumerSupervisor::new(
            QUEUE.to_owned(),
            Dispatcher::new(handlers::registry(&(
                Arc::new(MemoryStore::new()) as Arc<dyn ContentStore>
            ))),
            ready_tx,
            shutdown,
        );

        let result = supervisor
            .run(|| async { Err::<Arc<dyn Broker>, _>(BrokerError::ChannelClosed) })
            .await;

        assert!(result.is_ok());
    }
}
