//! [`Broker`] on top of Redis Streams.
//!
//! A queue is a stream with one consumer group. Publishing appends an entry holding the payload
//! in a single field and trims the stream to roughly [`BrokerConfig::max_queue_len`] entries;
//! consuming runs `XREADGROUP` on a dedicated connection. Under [`AckMode::OnDelivery`] reads
//! use `NOACK` and every entry read is deleted from the stream straight away. Under
//! [`AckMode::AfterHandling`] entries stay in the group's pending list until acknowledged, which
//! deletes them, and every new subscription first replays this consumer's pending entries.

use crate::{
    AckMode, Broker, BrokerConfig, BrokerError, Delivery, DeliveryStream, Result,
    retry::Exhausted,
};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use redis::{
    Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError,
    aio::{ConnectionManager, MultiplexedConnection},
    streams::{StreamId, StreamReadReply},
};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

pub const CONSUMER_GROUP: &str = "linkvote";
const PAYLOAD_FIELD: &str = "payload";
const NEW_ENTRIES: &str = ">";
const PENDING_ENTRIES: &str = "0";
const READ_BATCH: usize = 16;
const READ_BLOCK_MS: u64 = 5_000;

pub struct RedisBroker {
    client: Client,
    connection: ConnectionManager,
    ack_mode: AckMode,
    consumer: String,
    max_queue_len: u64,
}

impl RedisBroker {
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let client = Client::open(connection_info(config)).map_err(BrokerError::Connect)?;
        let connection = ConnectionManager::new(client.clone())
            .await
            .map_err(BrokerError::Connect)?;

        info!(host = %config.host, port = config.port, "Connected to broker");

        Ok(Self {
            client,
            connection,
            ack_mode: config.ack_mode,
            consumer: config.consumer.clone(),
            max_queue_len: config.max_queue_len,
        })
    }

    /// [`RedisBroker::connect`] under the configured retry policy.
    pub async fn connect_with_retry(config: &BrokerConfig) -> Result<Self> {
        config
            .retry_policy()
            .run("Connecting to broker", || Self::connect(config))
            .await
            .map_err(|Exhausted { attempts, last_error }| BrokerError::RetriesExhausted {
                attempts,
                last: Box::new(last_error),
            })
    }
}

fn connection_info(config: &BrokerConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            username: Some(config.user.clone()).filter(|user| !user.is_empty()),
            password: Some(config.pass.clone()).filter(|pass| !pass.is_empty()),
            ..RedisConnectionInfo::default()
        },
    }
}

fn is_connection_error(err: &RedisError) -> bool {
    err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_io_error()
        || err.is_timeout()
}

#[async_trait]
impl Broker for RedisBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(queue)
            .arg(CONSUMER_GROUP)
            .arg(PENDING_ENTRIES)
            .arg("MKSTREAM")
            .query_async(&mut connection)
            .await;

        match result {
            Ok(()) => {
                info!(queue, "Declared queue");
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => {
                debug!(queue, "Queue was already declared");
                Ok(())
            }
            Err(source) => Err(BrokerError::Declare {
                queue: queue.to_owned(),
                source,
            }),
        }
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let mut connection = self.connection.clone();
        let entry_id: String = redis::cmd("XADD")
            .arg(queue)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_queue_len)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut connection)
            .await
            .map_err(|source| BrokerError::Publish {
                queue: queue.to_owned(),
                source,
            })?;

        debug!(queue, %entry_id, "Published message");
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(BrokerError::Connect)?;

        let cursor = match self.ack_mode {
            AckMode::OnDelivery => NEW_ENTRIES,
            AckMode::AfterHandling => PENDING_ENTRIES,
        };
        let reader = StreamReader {
            connection,
            queue: queue.to_owned(),
            consumer: self.consumer.clone(),
            ack_mode: self.ack_mode,
            cursor: cursor.to_owned(),
            buffered: VecDeque::new(),
        };

        info!(queue, consumer = %self.consumer, ack_mode = ?self.ack_mode, "Subscribed to queue");

        let deliveries = stream::unfold(Some(reader), |reader| async move {
            let mut reader = reader?;
            match reader.next_delivery().await {
                Ok(delivery) => Some((Ok(delivery), Some(reader))),
                Err(err) => Some((Err(err), None)),
            }
        });

        Ok(deliveries.boxed())
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        if self.ack_mode == AckMode::OnDelivery {
            return Ok(());
        }

        let mut connection = self.connection.clone();
        let (acknowledged, _deleted): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(queue)
            .arg(CONSUMER_GROUP)
            .arg(&delivery.id)
            .cmd("XDEL")
            .arg(queue)
            .arg(&delivery.id)
            .query_async(&mut connection)
            .await?;

        if acknowledged == 0 {
            warn!(queue, delivery_id = %delivery.id, "Acknowledged entry was not pending");
        }
        Ok(())
    }
}

struct StreamReader {
    connection: MultiplexedConnection,
    queue: String,
    consumer: String,
    ack_mode: AckMode,
    /// `>` for new entries, otherwise the last pending entry id already handed out.
    cursor: String,
    buffered: VecDeque<Delivery>,
}

impl StreamReader {
    async fn next_delivery(&mut self) -> Result<Delivery> {
        loop {
            if let Some(delivery) = self.buffered.pop_front() {
                return Ok(delivery);
            }
            self.read_batch().await?;
        }
    }

    async fn read_batch(&mut self) -> Result<()> {
        let replaying = self.cursor != NEW_ENTRIES;

        let mut command = redis::cmd("XREADGROUP");
        command
            .arg("GROUP")
            .arg(CONSUMER_GROUP)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(READ_BATCH);
        if !replaying {
            command.arg("BLOCK").arg(READ_BLOCK_MS);
        }
        if self.ack_mode == AckMode::OnDelivery {
            command.arg("NOACK");
        }
        command.arg("STREAMS").arg(&self.queue).arg(&self.cursor);

        let reply: Option<StreamReadReply> = command
            .query_async(&mut self.connection)
            .await
            .map_err(|err| {
                if is_connection_error(&err) {
                    BrokerError::ConnectionLost(err.to_string())
                } else {
                    BrokerError::Redis(err)
                }
            })?;

        let entries: Vec<_> = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids)
            .collect();

        if replaying {
            match entries.last() {
                Some(last) => self.cursor.clone_from(&last.id),
                None => {
                    debug!(queue = %self.queue, "Finished replaying pending entries");
                    NEW_ENTRIES.clone_into(&mut self.cursor);
                }
            }
        }

        if self.ack_mode == AckMode::OnDelivery && !entries.is_empty() {
            self.delete(&entries).await;
        }

        // Entries without a payload are passed on empty so the consumer can drop and ack them.
        self.buffered.extend(entries.into_iter().map(|entry| Delivery {
            payload: entry.get(PAYLOAD_FIELD).unwrap_or_default(),
            id: entry.id,
        }));

        Ok(())
    }

    /// Removes entries that are already delivered. They are never read again, so a failure only
    /// leaves them for `MAXLEN` trimming.
    async fn delete(&mut self, entries: &[StreamId]) {
        let mut command = redis::cmd("XDEL");
        command.arg(&self.queue);
        for entry in entries {
            command.arg(&entry.id);
        }

        let deleted: redis::RedisResult<i64> = command.query_async(&mut self.connection).await;
        if let Err(err) = deleted {
            warn!(error = %err, queue = %self.queue, "Deleting delivered entries failed");
        }
    }
}
