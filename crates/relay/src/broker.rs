//! The broker port consumed by the publisher.

use std::collections::BTreeMap;

use async_trait::async_trait;

/// One message handed to the broker: an opaque payload plus string headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Partition/ordering key. Messages with the same key keep their order.
    pub key: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// String headers.
    pub headers: BTreeMap<String, String>,
}

impl Message {
    /// Returns a header value, if present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Broker delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The broker is temporarily unable to accept messages; retrying may succeed.
    #[error("transient broker error: {0}")]
    Transient(String),

    /// The broker rejected the messages; retrying will not help.
    #[error("permanent broker error: {0}")]
    Permanent(String),
}

impl BrokerError {
    /// Whether the publisher should retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A publish-at-least-once message channel.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes `messages` to `topic`.
    ///
    /// Returns `Ok` only once the broker has durably accepted every message.
    ///
    /// # Errors
    ///
    /// Returns a classified [`BrokerError`] when delivery fails.
    async fn publish(&self, topic: &str, messages: &[Message]) -> Result<(), BrokerError>;
}
