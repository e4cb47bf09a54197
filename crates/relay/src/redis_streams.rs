//! Redis Streams broker.
//!
//! Each topic is a stream key. A publish call appends every message with
//! `XADD` inside one `MULTI`/`EXEC` pipeline, so the appends run back to back
//! without commands from other clients in between. Redis has no rollback: if
//! one `XADD` fails inside `EXEC` the others still land, and a lost reply
//! leaves the outcome unknown. The relay then republishes the whole batch,
//! so consumers see duplicates and dedupe on the `event_id` header. Stream
//! entries carry the message key, every header and the payload as fields.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{ErrorKind, RedisError};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::broker::{Broker, BrokerError, Message};

/// Broker that appends to Redis Streams.
pub struct RedisStreamsBroker {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    max_len: Option<usize>,
}

impl std::fmt::Debug for RedisStreamsBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamsBroker")
            .field("max_len", &self.max_len)
            .finish_non_exhaustive()
    }
}

impl RedisStreamsBroker {
    /// Creates a broker for `url`. No connection is opened until the first
    /// publish.
    ///
    /// `max_len` caps each stream approximately (`XADD MAXLEN ~`).
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Permanent` if the URL is invalid.
    pub fn new(url: &str, max_len: Option<usize>) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)
            .map_err(|e| BrokerError::Permanent(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            max_len,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BrokerError> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| classify(&e))?;
        *cached = Some(conn.clone());
        Ok(conn)
    }

    async fn drop_connection(&self) {
        self.connection.lock().await.take();
    }

    fn pipeline(&self, topic: &str, messages: &[Message]) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for message in messages {
            pipe.cmd("XADD").arg(topic);
            if let Some(max_len) = self.max_len {
                pipe.arg("MAXLEN").arg("~").arg(max_len);
            }
            pipe.arg("*").arg("key").arg(&message.key);
            for (name, value) in &message.headers {
                pipe.arg(name).arg(value);
            }
            pipe.arg("payload").arg(message.payload.as_slice()).ignore();
        }
        pipe
    }
}

#[async_trait]
impl Broker for RedisStreamsBroker {
    #[instrument(skip(self, messages), fields(stream = %topic, count = messages.len()), err)]
    async fn publish(&self, topic: &str, messages: &[Message]) -> Result<(), BrokerError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;
        let result: redis::RedisResult<()> = self
            .pipeline(topic, messages)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                let classified = classify(&err);
                if classified.is_transient() {
                    // Reconnect on the next attempt.
                    self.drop_connection().await;
                }
                Err(classified)
            }
        }
    }
}

/// Maps a Redis error onto the retry taxonomy.
fn classify(err: &RedisError) -> BrokerError {
    let transient = err.is_io_error()
        || err.is_connection_refusal()
        || err.is_timeout()
        || err.is_connection_dropped()
        || matches!(
            err.kind(),
            ErrorKind::TryAgain
                | ErrorKind::BusyLoadingError
                | ErrorKind::ClusterDown
                | ErrorKind::MasterDown
        );

    if transient {
        BrokerError::Transient(err.to_string())
    } else {
        BrokerError::Permanent(err.to_string())
    }
}
