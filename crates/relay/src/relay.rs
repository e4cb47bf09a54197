//! The outbox relay loop.
//!
//! One pass fetches a batch of unpublished rows (oldest first), publishes
//! consecutive rows that share a topic as one broker call, and stamps the
//! acknowledged rows. Rows that can never be delivered (a payload that is not
//! JSON, or a message the broker rejects permanently) are dead-lettered so
//! they stop blocking the rows behind them. A transient failure that outlasts
//! the retry policy ends the pass; whatever was settled before it is still
//! recorded, the rest waits for the next pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tally_core::events::OutboxEntry;
use tally_db::{OutboxStore, RepositoryError};
use tally_shared::config::RelayConfig;
use tally_shared::types::EventId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::broker::{Broker, Message};
use crate::envelope::to_message;
use crate::publisher::{PublishError, Publisher, RetryPolicy};
use crate::router::TopicRouter;

const DEFAULT_BATCH_SIZE: u64 = 100;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Relay failure.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Reading or stamping the outbox failed.
    #[error("outbox store error: {0}")]
    Store(#[from] RepositoryError),

    /// The broker did not acknowledge a group of rows.
    #[error("failed to publish event {event_id} to {topic}: {source}")]
    Publish {
        /// First row of the failed group.
        event_id: EventId,
        /// Target topic.
        topic: String,
        /// Publisher failure.
        #[source]
        source: PublishError,
    },
}

impl RelayError {
    /// Whether the pass stopped because of cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Publish {
                source: PublishError::Cancelled { .. },
                ..
            }
        )
    }
}

/// Outcome of one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Rows fetched.
    pub fetched: usize,
    /// Rows the broker acknowledged.
    pub published: usize,
    /// Rows stamped by this pass. Lower than `published` when another relay
    /// stamped some of them first.
    pub marked: u64,
    /// Rows taken out of delivery by this pass.
    pub dead_lettered: usize,
}

impl RelayReport {
    /// Whether every fetched row was either published or dead-lettered.
    #[must_use]
    pub const fn settled_all(&self) -> bool {
        self.published + self.dead_lettered == self.fetched
    }
}

/// Rows a pass has finished with, one way or the other.
#[derive(Debug, Default)]
struct Settled {
    acked: Vec<EventId>,
    dead: Vec<(EventId, String)>,
}

impl Settled {
    fn dead_letter(&mut self, event_id: EventId, topic: &str, reason: String) {
        error!(%event_id, topic, reason = %reason, "dead-lettering outbox row");
        self.dead.push((event_id, reason));
    }
}

/// Moves outbox rows to the broker.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    publisher: Publisher,
    router: TopicRouter,
    batch_size: u64,
    poll_interval: Duration,
}

impl std::fmt::Debug for OutboxRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxRelay")
            .field("publisher", &self.publisher)
            .field("router", &self.router)
            .field("batch_size", &self.batch_size)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl OutboxRelay {
    /// Creates a relay with the default batch size and poll interval.
    #[must_use]
    pub fn new(store: Arc<dyn OutboxStore>, publisher: Publisher, router: TopicRouter) -> Self {
        Self {
            store,
            publisher,
            router,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Creates a relay from the relay configuration.
    #[must_use]
    pub fn from_config(
        store: Arc<dyn OutboxStore>,
        broker: Arc<dyn Broker>,
        config: &RelayConfig,
    ) -> Self {
        Self::new(
            store,
            Publisher::new(broker, RetryPolicy::from_config(config)),
            TopicRouter::from_config(config),
        )
        .with_batch_size(config.batch_size)
        .with_poll_interval(config.poll_interval())
    }

    /// Sets the number of rows fetched per pass (at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the idle delay between passes.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs one pass.
    ///
    /// # Errors
    ///
    /// Returns the first failure that ended the pass. Rows settled before it
    /// are already recorded.
    #[instrument(skip_all, fields(batch_size = self.batch_size), err)]
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<RelayReport, RelayError> {
        self.pass(&self.publisher, cancel).await
    }

    /// Runs one pass that makes a single broker attempt per group and never
    /// backs off. Meant for callers on a latency-sensitive path; rows that
    /// fail stay queued for the background relay.
    ///
    /// # Errors
    ///
    /// Same as [`OutboxRelay::run_once`].
    #[instrument(skip_all, fields(batch_size = self.batch_size), err)]
    pub async fn run_once_without_retry(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RelayReport, RelayError> {
        let publisher = self
            .publisher
            .with_policy(self.publisher.policy().single_attempt());
        self.pass(&publisher, cancel).await
    }

    async fn pass(
        &self,
        publisher: &Publisher,
        cancel: &CancellationToken,
    ) -> Result<RelayReport, RelayError> {
        let batch = self.store.fetch_unpublished(self.batch_size).await?;
        let mut report = RelayReport {
            fetched: batch.len(),
            ..RelayReport::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }

        let mut settled = Settled::default();
        let outcome = self
            .publish_batch(publisher, &batch, cancel, &mut settled)
            .await;

        report.published = settled.acked.len();
        if !settled.acked.is_empty() {
            report.marked = self.store.mark_published(&settled.acked, Utc::now()).await?;
        }
        report.dead_lettered = settled.dead.len();
        let now = Utc::now();
        for (event_id, reason) in &settled.dead {
            self.store.mark_dead_lettered(*event_id, reason, now).await?;
        }
        debug!(
            fetched = report.fetched,
            published = report.published,
            marked = report.marked,
            dead_lettered = report.dead_lettered,
            "relay pass finished"
        );

        outcome.map(|()| report)
    }

    async fn publish_batch(
        &self,
        publisher: &Publisher,
        batch: &[OutboxEntry],
        cancel: &CancellationToken,
        settled: &mut Settled,
    ) -> Result<(), RelayError> {
        let same_topic = |a: &OutboxEntry, b: &OutboxEntry| {
            self.router.topic_for(&a.aggregate_type) == self.router.topic_for(&b.aggregate_type)
        };

        for group in batch.chunk_by(same_topic) {
            let Some(first) = group.first() else {
                continue;
            };
            let topic = self.router.topic_for(&first.aggregate_type);

            let mut ids = Vec::with_capacity(group.len());
            let mut messages = Vec::with_capacity(group.len());
            for entry in group {
                match to_message(entry) {
                    Ok(message) => {
                        ids.push(entry.id);
                        messages.push(message);
                    }
                    Err(source) => {
                        settled.dead_letter(entry.id, topic, format!("malformed payload: {source}"));
                    }
                }
            }

            publish_group(publisher, topic, &ids, &messages, cancel, settled).await?;
        }
        Ok(())
    }

    /// Runs passes until `cancel` fires.
    ///
    /// After a full batch the next pass starts immediately; otherwise the
    /// relay sleeps for the poll interval. Failed passes are logged and
    /// retried on the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            batch_size = self.batch_size,
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "outbox relay started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let backlog = match self.run_once(&cancel).await {
                Ok(report) => {
                    report.settled_all()
                        && u64::try_from(report.fetched).is_ok_and(|n| n >= self.batch_size)
                }
                Err(err) if err.is_cancelled() => break,
                Err(err) => {
                    warn!(error = %err, "relay pass failed");
                    false
                }
            };
            if backlog {
                continue;
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("outbox relay stopped");
    }
}

/// Publishes one topic group. A permanent rejection of a multi-row group is
/// retried row by row so only the rejected rows are dead-lettered.
async fn publish_group(
    publisher: &Publisher,
    topic: &str,
    ids: &[EventId],
    messages: &[Message],
    cancel: &CancellationToken,
    settled: &mut Settled,
) -> Result<(), RelayError> {
    let Some(&first) = ids.first() else {
        return Ok(());
    };
    let publish_error = |event_id: EventId, source: PublishError| RelayError::Publish {
        event_id,
        topic: topic.to_string(),
        source,
    };

    match publisher.publish(topic, messages, cancel).await {
        Ok(_) => {
            settled.acked.extend_from_slice(ids);
            Ok(())
        }
        Err(PublishError::Permanent(reason)) if ids.len() == 1 => {
            settled.dead_letter(first, topic, format!("rejected by broker: {reason}"));
            Ok(())
        }
        Err(PublishError::Permanent(reason)) => {
            warn!(topic, count = ids.len(), error = %reason, "broker rejected batch, publishing rows one by one");
            for (&event_id, message) in ids.iter().zip(messages) {
                match publisher
                    .publish(topic, std::slice::from_ref(message), cancel)
                    .await
                {
                    Ok(_) => settled.acked.push(event_id),
                    Err(PublishError::Permanent(reason)) => {
                        settled.dead_letter(event_id, topic, format!("rejected by broker: {reason}"));
                    }
                    Err(source) => return Err(publish_error(event_id, source)),
                }
            }
            Ok(())
        }
        Err(source) => Err(publish_error(first, source)),
    }
}
