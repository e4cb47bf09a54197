//! Aggregate root trait for the transactional persistence pattern.
//!
//! Aggregates are immutable values: every transition returns a new copy with
//! `version + 1` and the emitted events appended to its pending buffer. The
//! repository persists the state with a version check and drains the buffer
//! into the outbox in one transaction.

use crate::events::DomainEvent;

/// Aggregate root with an optimistic-concurrency version and an event buffer.
pub trait Aggregate: Clone + Send + Sync {
    /// Strongly-typed aggregate identifier.
    type Id: Copy + Eq + std::fmt::Display + Send + Sync;

    /// Event type buffered by this aggregate.
    type Event: DomainEvent + Clone;

    /// Aggregate type name, as stored in the outbox.
    const AGGREGATE_TYPE: &'static str;

    /// Returns the aggregate identifier.
    fn id(&self) -> Self::Id;

    /// Current version. Starts at 1 and increases by exactly 1 per transition.
    fn version(&self) -> i64;

    /// Events produced since the aggregate was created or loaded.
    fn pending_events(&self) -> &[Self::Event];

    /// Returns a copy with the event buffer cleared.
    #[must_use]
    fn without_events(&self) -> Self;
}
