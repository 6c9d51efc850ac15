//! Durable work queues between the gateway and the content service.
//!
//! A [`Broker`] declares queues, publishes opaque payloads to them and hands out a single
//! consumption stream per queue. Whether a delivery counts as acknowledged on receipt or only
//! after [`Broker::ack`] is decided by the broker's [`AckMode`].

pub mod memory;
pub mod retry;
pub mod streams;

pub use memory::MemoryBroker;
pub use retry::RetryPolicy;
pub use streams::RedisBroker;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use std::{
    fmt::{Debug, Formatter},
    time::Duration,
};
use thiserror::Error;

pub type Result<T, E = BrokerError> = std::result::Result<T, E>;

pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connecting to the broker failed: {0}")]
    Connect(#[source] redis::RedisError),
    #[error("Gave up connecting to the broker after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<BrokerError>,
    },
    #[error("Declaring queue {queue} failed: {source}")]
    Declare {
        queue: String,
        source: redis::RedisError,
    },
    #[error("Publishing to queue {queue} failed: {source}")]
    Publish {
        queue: String,
        source: redis::RedisError,
    },
    #[error("Queue {0} has not been declared")]
    UnknownQueue(String),
    #[error("Queue {0} already has a consumer")]
    AlreadyConsumed(String),
    #[error("The broker channel is closed")]
    ChannelClosed,
    #[error("Connection to the broker was lost: {0}")]
    ConnectionLost(String),
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// When a delivered message stops being the broker's responsibility.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Acknowledged the moment it is handed to the consumer. A failure while handling it loses
    /// the message, but it is never handled twice.
    #[default]
    OnDelivery,
    /// Acknowledged only through [`Broker::ack`]. Unacknowledged messages are handed out again
    /// when the queue is next consumed.
    AfterHandling,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Delivery {
    /// Broker-assigned, unique within the queue.
    pub id: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Creates a durable queue. Declaring an existing queue is a no-op.
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()>;

    /// Subscribes to `queue`. The stream does not end on its own; after yielding an error it is
    /// finished and the queue has to be consumed again.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream>;

    /// No-op under [`AckMode::OnDelivery`].
    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()>;
}

fn default_connect_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

fn default_connect_backoff_ms() -> u64 {
    u64::try_from(RetryPolicy::default().initial_backoff.as_millis()).unwrap_or(u64::MAX)
}

fn default_consumer() -> String {
    "content-service".to_owned()
}

fn default_max_queue_len() -> u64 {
    10_000
}

/// Connection settings, read from `BROKER_*` environment variables.
#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub queue: String,
    #[serde(default)]
    pub ack_mode: AckMode,
    #[serde(default = "default_consumer")]
    pub consumer: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    /// Rough upper bound on entries kept in a queue. Older entries are trimmed on publish.
    #[serde(default = "default_max_queue_len")]
    pub max_queue_len: u64,
}

impl BrokerConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            initial_backoff: Duration::from_millis(self.connect_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

impl Debug for BrokerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &"[redacted]")
            .field("queue", &self.queue)
            .field("ack_mode", &self.ack_mode)
            .field("consumer", &self.consumer)
            .field("connect_attempts", &self.connect_attempts)
            .field("connect_backoff_ms", &self.connect_backoff_ms)
            .field("max_queue_len", &self.max_queue_len)
            .finish()
    }
}
