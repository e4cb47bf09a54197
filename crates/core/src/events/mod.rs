//! Domain events and their at-rest outbox representation.
//!
//! Aggregates buffer events as plain values; the repository turns each one
//! into an [`OutboxEntry`] inside the same transaction as the state change.

pub mod domain_event;
pub mod ledger;
pub mod outbox;

pub use domain_event::DomainEvent;
pub use ledger::{
    EntryPosted, EntryReversed, FISCAL_PERIOD_AGGREGATE, JOURNAL_ENTRY_AGGREGATE, LedgerEvent,
    PeriodClosed,
};
pub use outbox::OutboxEntry;
