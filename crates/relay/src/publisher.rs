//! Retrying publisher.
//!
//! Transient broker failures are retried up to `max_attempts` with linear
//! backoff (`base_delay * attempt`). Permanent failures return immediately.
//! Cancellation is checked before every attempt and while backing off.

use std::sync::Arc;
use std::time::Duration;

use tally_shared::config::RelayConfig;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::broker::{Broker, BrokerError, Message};

/// Bounded retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per publish, the first one included. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Backoff unit. The wait after attempt `n` is `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from the relay configuration.
    #[must_use]
    pub const fn from_config(config: &RelayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.backoff(),
        }
    }

    /// The same policy limited to one attempt, so a publish never sleeps.
    #[must_use]
    pub const fn single_attempt(self) -> Self {
        Self {
            max_attempts: 1,
            base_delay: self.base_delay,
        }
    }

    /// Delay before the attempt following `attempt`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Why a publish gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Every attempt failed transiently.
    #[error("broker still unavailable after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The last failure.
        #[source]
        last: BrokerError,
    },

    /// The broker rejected the messages.
    #[error("broker rejected messages: {0}")]
    Permanent(#[source] BrokerError),

    /// Cancelled before the broker acknowledged.
    #[error("publish cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts made before cancellation.
        attempts: u32,
    },
}

impl PublishError {
    /// Whether a later relay pass may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

/// Publishes batches through a [`Broker`] with bounded retry.
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn Broker>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Creates a publisher.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, policy: RetryPolicy) -> Self {
        Self { broker, policy }
    }

    /// The retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// A publisher on the same broker with another policy.
    #[must_use]
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            broker: self.broker.clone(),
            policy,
        }
    }

    /// Publishes `messages` to `topic`, retrying transient failures.
    ///
    /// Returns the number of attempts it took.
    ///
    /// # Errors
    ///
    /// - `PublishError::Permanent` on the first permanent failure
    /// - `PublishError::Exhausted` once every attempt failed transiently
    /// - `PublishError::Cancelled` if `cancel` fired first
    #[instrument(skip(self, messages, cancel), fields(topic = %topic, count = messages.len()), err)]
    pub async fn publish(
        &self,
        topic: &str,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<u32, PublishError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(PublishError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let err = match self.broker.publish(topic, messages).await {
                Ok(()) => return Ok(attempt),
                Err(err) if !err.is_transient() => return Err(PublishError::Permanent(err)),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(PublishError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.policy.delay_after(attempt);
            warn!(attempt, max_attempts, ?delay, error = %err, "transient publish failure, retrying");

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(PublishError::Cancelled { attempts: attempt });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
