//! Redis Streams-based queue for forecast advisory notifications.
//!
//! Each stream entry carries the JSON message in `payload` and the number of
//! previous deliveries in `attempts`. Entries stay in the consumer group's
//! pending list until acknowledged. A consumer first re-reads its own
//! pending entries, then takes over entries another consumer has left idle
//! for longer than `claim_idle_ms`, and only then reads new ones. The
//! keep-alive resets an entry's idle time, so a live consumer keeps its
//! message while one that died loses it to the next reader.

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, streams::*, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use hydro_common::InboundMessage;

const PAYLOAD_FIELD: &str = "payload";
const ATTEMPTS_FIELD: &str = "attempts";

/// Broker-level failure. Raised only for problems talking to the queue itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Broker channel error: {0}")]
    Channel(String),

    #[error("Malformed stream entry {entry_id}: {message}")]
    MalformedEntry { entry_id: String, message: String },
}

/// A message handed to the consumer and not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub entry_id: String,
    pub payload: Vec<u8>,
    /// Deliveries of this payload before this one.
    pub attempts: u32,
}

/// Queue operations the message lifecycle controller needs.
#[async_trait]
pub trait MessageQueue: Send {
    /// Wait for the next message. `None` when nothing arrived in time.
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a fully processed message.
    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Negatively acknowledge and requeue a message.
    async fn nack(&mut self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Refresh the consumer's claim on an in-flight message.
    async fn keep_alive(&mut self, delivery: &Delivery) -> Result<(), QueueError>;
}

/// Queue connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub redis_url: String,
    /// Stream key holding notifications
    pub stream: String,
    /// Consumer group shared by all domain generator processes
    pub group: String,
    /// Name of this consumer within the group
    pub consumer: String,
    /// How long a read blocks waiting for a new entry
    #[serde(default = "default_block_ms")]
    pub block_ms: usize,
    /// Idle time after which another consumer's pending entry is taken over
    #[serde(default = "default_claim_idle_ms")]
    pub claim_idle_ms: u64,
}

fn default_block_ms() -> usize {
    5000
}

fn default_claim_idle_ms() -> u64 {
    120_000
}

/// Redis Streams forecast queue.
pub struct ForecastQueue {
    conn: MultiplexedConnection,
    config: QueueConfig,
    /// Own pending entries still to be re-read, after a restart or a
    /// failed acknowledgement.
    recovering: bool,
    /// XAUTOCLAIM scan position; "0-0" starts a new pass.
    claim_cursor: String,
}

impl ForecastQueue {
    /// Connect to Redis and make sure the stream and consumer group exist.
    pub async fn connect(config: QueueConfig) -> Result<Self, QueueError> {
        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        // Create consumer group if it doesn't exist; start from the beginning
        // so entries published before the first consumer are not skipped.
        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&config.stream)
            .arg(&config.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => {
                info!(stream = %config.stream, group = %config.group, "Created consumer group")
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(QueueError::Channel(e.to_string())),
        }

        Ok(Self {
            conn,
            config,
            recovering: true,
            claim_cursor: "0-0".to_string(),
        })
    }

    /// Publish a notification. Returns the stream entry id.
    pub async fn publish(&mut self, message: &InboundMessage) -> Result<String, QueueError> {
        let payload = message
            .to_json()
            .map_err(|e| QueueError::Channel(format!("serialization failed: {}", e)))?;
        self.add_entry(payload.as_bytes(), 0).await
    }

    /// Number of entries in the stream.
    pub async fn depth(&mut self) -> Result<u64, QueueError> {
        let info: StreamInfoStreamReply = self
            .conn
            .xinfo_stream(&self.config.stream)
            .await
            .map_err(channel_error)?;

        Ok(info.length as u64)
    }

    async fn add_entry(&mut self, payload: &[u8], attempts: u32) -> Result<String, QueueError> {
        let entry_id: String = redis::cmd("XADD")
            .arg(&self.config.stream)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .arg(ATTEMPTS_FIELD)
            .arg(attempts)
            .query_async(&mut self.conn)
            .await
            .map_err(channel_error)?;

        Ok(entry_id)
    }

    async fn read_one(&mut self, start: &str, block: bool) -> Result<Option<Delivery>, QueueError> {
        let mut opts = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(1);
        if block {
            opts = opts.block(self.config.block_ms);
        }

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.config.stream], &[start], &opts)
            .await
            .map_err(channel_error)?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        for stream_key in reply.keys {
            if let Some(entry) = stream_key.ids.into_iter().next() {
                return decode_entry(&entry).map(Some);
            }
        }

        Ok(None)
    }

    /// Take over at most one entry left idle by another consumer.
    async fn claim_abandoned(&mut self) -> Result<Option<Delivery>, QueueError> {
        let reply: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream)
            .arg(&self.config.group)
            .arg(&self.config.consumer)
            .arg(self.config.claim_idle_ms)
            .arg(&self.claim_cursor)
            .arg("COUNT")
            .arg(1)
            .query_async(&mut self.conn)
            .await
            .map_err(channel_error)?;

        let (cursor, claimed) = decode_autoclaim(&reply)?;
        self.claim_cursor = cursor;

        match claimed.first() {
            Some(entry) => decode_entry(entry).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MessageQueue for ForecastQueue {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError> {
        if self.recovering {
            // Id "0" re-reads entries delivered to this consumer but never
            // acknowledged, oldest first.
            match self.read_one("0", false).await? {
                Some(delivery) => {
                    info!(entry_id = %delivery.entry_id, "Recovered unacknowledged message");
                    return Ok(Some(delivery));
                }
                None => self.recovering = false,
            }
        }

        if let Some(delivery) = self.claim_abandoned().await? {
            warn!(
                entry_id = %delivery.entry_id,
                idle_ms = self.config.claim_idle_ms,
                "Claimed message abandoned by another consumer"
            );
            return Ok(Some(delivery));
        }

        self.read_one(">", true).await
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        let acked: redis::RedisResult<i64> = self
            .conn
            .xack(&self.config.stream, &self.config.group, &[&delivery.entry_id])
            .await;

        if let Err(e) = acked {
            // The entry is still pending for this consumer
            self.recovering = true;
            return Err(channel_error(e));
        }

        debug!(entry_id = %delivery.entry_id, "Acknowledged");
        Ok(())
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        // Requeue as a new entry and drop the old one from the pending list
        // in one MULTI/EXEC. Redis does not roll back, so if XACK fails after
        // XADD the message exists twice and is delivered twice.
        let requeued: redis::RedisResult<(String, i64)> = redis::pipe()
            .atomic()
            .cmd("XADD")
            .arg(&self.config.stream)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&delivery.payload)
            .arg(ATTEMPTS_FIELD)
            .arg(delivery.attempts + 1)
            .cmd("XACK")
            .arg(&self.config.stream)
            .arg(&self.config.group)
            .arg(&delivery.entry_id)
            .query_async(&mut self.conn)
            .await;

        let (new_id, _) = match requeued {
            Ok(reply) => reply,
            Err(e) => {
                self.recovering = true;
                return Err(channel_error(e));
            }
        };

        info!(entry_id = %delivery.entry_id, requeued_as = %new_id, "Requeued message");
        Ok(())
    }

    async fn keep_alive(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        // XCLAIM with zero min-idle resets the entry's idle time. An empty
        // reply means the entry is no longer pending for this group.
        let claimed: Vec<String> = redis::cmd("XCLAIM")
            .arg(&self.config.stream)
            .arg(&self.config.group)
            .arg(&self.config.consumer)
            .arg(0)
            .arg(&delivery.entry_id)
            .arg("JUSTID")
            .query_async(&mut self.conn)
            .await
            .map_err(channel_error)?;

        if claimed.is_empty() {
            return Err(QueueError::Channel(format!(
                "entry {} is no longer pending",
                delivery.entry_id
            )));
        }

        Ok(())
    }
}

fn channel_error(err: redis::RedisError) -> QueueError {
    if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        QueueError::Connection(err.to_string())
    } else {
        QueueError::Channel(err.to_string())
    }
}

fn decode_entry(entry: &StreamId) -> Result<Delivery, QueueError> {
    let payload: Vec<u8> = entry
        .get(PAYLOAD_FIELD)
        .ok_or_else(|| QueueError::MalformedEntry {
            entry_id: entry.id.clone(),
            message: format!("missing '{}' field", PAYLOAD_FIELD),
        })?;

    let attempts: u32 = entry.get(ATTEMPTS_FIELD).unwrap_or(0);

    Ok(Delivery {
        entry_id: entry.id.clone(),
        payload,
        attempts,
    })
}

/// Split an XAUTOCLAIM reply into the next cursor and the claimed entries.
/// Redis 7 appends a third element listing deleted ids, which is ignored.
fn decode_autoclaim(reply: &redis::Value) -> Result<(String, Vec<StreamId>), QueueError> {
    let redis::Value::Array(parts) = reply else {
        return Err(QueueError::Channel(format!(
            "unexpected XAUTOCLAIM reply: {:?}",
            reply
        )));
    };

    let (Some(cursor), Some(entries)) = (parts.first(), parts.get(1)) else {
        return Err(QueueError::Channel(format!(
            "XAUTOCLAIM reply has {} elements",
            parts.len()
        )));
    };

    let cursor: String = redis::from_redis_value(cursor).map_err(channel_error)?;
    let claimed: StreamRangeReply = redis::from_redis_value(entries).map_err(channel_error)?;

    Ok((cursor, claimed.ids))
}
