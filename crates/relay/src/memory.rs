//! Process-local broker.
//!
//! Keeps published messages in memory and can be scripted to fail, which
//! makes it the broker of choice for tests and for running `tallyd` without
//! Redis.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::broker::{Broker, BrokerError, Message};

/// A message as recorded by [`InMemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Topic it was published to.
    pub topic: String,
    /// The message.
    pub message: Message,
}

#[derive(Debug, Default)]
struct State {
    published: Vec<PublishedMessage>,
    scripted_failures: VecDeque<BrokerError>,
    unavailable_topics: HashSet<String>,
    rejected_keys: HashSet<String>,
    calls: usize,
}

/// Broker that records messages in memory.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
}

impl InMemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next publish call fail with `error`. Calls queue up: scripting
    /// two failures fails the next two calls.
    pub fn fail_next(&self, error: BrokerError) {
        self.lock().scripted_failures.push_back(error);
    }

    /// Makes the next `n` publish calls fail transiently.
    pub fn fail_next_transient(&self, n: usize) {
        let mut state = self.lock();
        for attempt in 1..=n {
            state
                .scripted_failures
                .push_back(BrokerError::Transient(format!("scripted failure {attempt}")));
        }
    }

    /// Marks a topic as unavailable: publishes to it fail transiently until
    /// it is made available again.
    pub fn set_unavailable(&self, topic: &str, unavailable: bool) {
        let mut state = self.lock();
        if unavailable {
            state.unavailable_topics.insert(topic.to_string());
        } else {
            state.unavailable_topics.remove(topic);
        }
    }

    /// Rejects, permanently, every call that carries a message with `key`.
    pub fn reject_key(&self, key: &str) {
        self.lock().rejected_keys.insert(key.to_string());
    }

    /// Every message accepted so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    /// Messages accepted on one topic.
    #[must_use]
    pub fn published_on(&self, topic: &str) -> Vec<Message> {
        self.lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.message.clone())
            .collect()
    }

    /// Number of publish calls, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, messages: &[Message]) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.calls += 1;
        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }
        if state.unavailable_topics.contains(topic) {
            return Err(BrokerError::Transient(format!("topic {topic} unavailable")));
        }
        if let Some(rejected) = messages
            .iter()
            .find(|m| state.rejected_keys.contains(&m.key))
        {
            return Err(BrokerError::Permanent(format!(
                "message {} rejected",
                rejected.key
            )));
        }
        state
            .published
            .extend(messages.iter().cloned().map(|message| PublishedMessage {
                topic: topic.to_string(),
                message,
            }));
        Ok(())
    }
}
