//! Application use cases for the Tally ledger.
//!
//! [`LedgerService`] composes the domain (`tally-core`) with persistence
//! (`tally-db`): it loads aggregates, applies transitions, checks fiscal
//! periods and writes state, outbox rows and balance deltas together.

pub mod error;
pub mod ledger;
pub mod request;

pub use error::ServiceError;
pub use ledger::LedgerService;
pub use request::{NewJournalEntry, PostingRequest};
