//! Outbox relay.
//!
//! Moves committed outbox rows to the message broker:
//! - [`Broker`] is the port; [`RedisStreamsBroker`] and [`InMemoryBroker`]
//!   implement it
//! - [`Publisher`] retries transient broker failures with linear backoff
//! - [`OutboxRelay`] fetches unpublished rows, publishes them, and stamps the
//!   acknowledged ones
//!
//! Delivery is at-least-once. A row is marked published only after the broker
//! acknowledged it, so a crash between the two replays the row.

pub mod broker;
pub mod envelope;
pub mod memory;
pub mod publisher;
pub mod redis_streams;
pub mod relay;
pub mod router;

pub use broker::{Broker, BrokerError, Message};
pub use memory::{InMemoryBroker, PublishedMessage};
pub use publisher::{PublishError, Publisher, RetryPolicy};
pub use redis_streams::RedisStreamsBroker;
pub use relay::{OutboxRelay, RelayError, RelayReport};
pub use router::TopicRouter;
