//! Double-entry ledger domain.
//!
//! This module implements the core ledger functionality:
//! - Value objects: account codes, posting pairs, fiscal periods
//! - The `JournalEntry` aggregate and its state machine
//! - Balance projection math
//! - Posting validation
//! - Nostro reconciliation against external statements
//! - Error types for ledger operations

pub mod account_code;
pub mod balance;
pub mod error;
pub mod fiscal_period;
pub mod journal_entry;
pub mod posting_pair;
pub mod reconciliation;
pub mod validation;

#[cfg(test)]
mod journal_entry_props;
#[cfg(test)]
mod posting_pair_props;

pub use account_code::AccountCode;
pub use balance::{AccountBalance, BalanceDelta, posting_deltas};
pub use error::LedgerError;
pub use fiscal_period::{FiscalPeriod, PeriodStatus};
pub use journal_entry::{EntryStatus, JournalEntry, JournalEntryRecord};
pub use posting_pair::PostingPair;
pub use reconciliation::{
    Direction, ExternalStatementEntry, InternalLedgerEntry, ReconciliationResult,
    ReconciliationStatus, ReconciliationSummary, reconcile,
};
pub use validation::{currency_totals, validate_postings};
