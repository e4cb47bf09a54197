//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod balance;
pub mod error;
pub mod fiscal_period;
pub mod journal;
pub mod outbox;

pub use balance::BalanceRepository;
pub use error::RepositoryError;
pub use fiscal_period::{CloseOutcome, FiscalPeriodRepository};
pub use journal::JournalEntryRepository;
pub use outbox::{OutboxRepository, OutboxStore};
