//! Ledger error types for validation and state errors.
//!
//! Everything here is raised before any I/O happens and is deterministic:
//! retrying the same call with the same input fails the same way.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::types::{CurrencyError, JournalEntryId};
use thiserror::Error;

use super::account_code::AccountCode;
use super::fiscal_period::FiscalPeriod;
use super::journal_entry::EntryStatus;

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ========== Value Object Errors ==========
    /// Account code does not match `NNNN` or `NNNN-NNN`.
    #[error("invalid account code {0:?}: expected NNNN or NNNN-NNN")]
    InvalidAccountCode(String),

    /// Debit and credit legs name the same account.
    #[error("debit and credit accounts must differ, both are {0}")]
    SelfPosting(AccountCode),

    /// Posting amount is zero or negative.
    #[error("posting amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Posting currency is missing or malformed.
    #[error("invalid posting currency: {0}")]
    Currency(#[from] CurrencyError),

    /// Fiscal year outside the supported range.
    #[error("fiscal year {0} is outside 2000..=2100")]
    InvalidFiscalYear(i32),

    /// Fiscal month outside 1..=12.
    #[error("fiscal month {0} is outside 1..=12")]
    InvalidFiscalMonth(u32),

    /// Text that is not a `YYYY-MM` period.
    #[error("invalid fiscal period {0:?}: expected YYYY-MM")]
    InvalidFiscalPeriod(String),

    // ========== Aggregate Construction Errors ==========
    /// Tenant id is the nil UUID.
    #[error("tenant id is required")]
    MissingTenant,

    /// Entry has no posting pairs.
    #[error("at least one posting pair is required")]
    NoPostings,

    /// Effective date falls outside every supported fiscal period.
    #[error("effective date {0} is outside the supported fiscal range")]
    InvalidEffectiveDate(NaiveDate),

    /// Backvalue date lies after the current date.
    #[error("backvalue date {date} is after today ({today})")]
    FutureEffectiveDate {
        /// Requested effective date.
        date: NaiveDate,
        /// Current date at the time of the call.
        today: NaiveDate,
    },

    // ========== State Transition Errors ==========
    /// Transition attempted from the wrong status.
    #[error("cannot {operation} entry {entry_id}: status is {actual}, must be {required}")]
    InvalidTransition {
        /// The entry being transitioned.
        entry_id: JournalEntryId,
        /// Operation name (`post`, `reverse`, `backvalue`).
        operation: &'static str,
        /// Status the operation requires.
        required: EntryStatus,
        /// Status the entry is actually in.
        actual: EntryStatus,
    },

    /// Posting into a closed fiscal period.
    #[error("fiscal period {0} is closed, no posting allowed")]
    PeriodClosed(FiscalPeriod),

    /// Closing a period that is already closed.
    #[error("fiscal period {0} is already closed")]
    PeriodAlreadyClosed(FiscalPeriod),

    // ========== Reconciliation Errors ==========
    /// Reconciliation requested without an account id.
    #[error("account id is required for reconciliation")]
    MissingReconciliationAccount,
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAccountCode(_) => "INVALID_ACCOUNT_CODE",
            Self::SelfPosting(_) => "SELF_POSTING",
            Self::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            Self::Currency(CurrencyError::Empty) => "EMPTY_CURRENCY",
            Self::Currency(CurrencyError::Invalid(_)) => "INVALID_CURRENCY",
            Self::InvalidFiscalYear(_) => "INVALID_FISCAL_YEAR",
            Self::InvalidFiscalMonth(_) => "INVALID_FISCAL_MONTH",
            Self::InvalidFiscalPeriod(_) => "INVALID_FISCAL_PERIOD",
            Self::MissingTenant => "MISSING_TENANT",
            Self::NoPostings => "NO_POSTINGS",
            Self::InvalidEffectiveDate(_) => "INVALID_EFFECTIVE_DATE",
            Self::FutureEffectiveDate { .. } => "FUTURE_EFFECTIVE_DATE",
            Self::InvalidTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::PeriodClosed(_) => "PERIOD_CLOSED",
            Self::PeriodAlreadyClosed(_) => "PERIOD_ALREADY_CLOSED",
            Self::MissingReconciliationAccount => "MISSING_ACCOUNT_ID",
        }
    }

    /// Returns true for state-transition errors, false for validation errors.
    #[must_use]
    pub const fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::PeriodClosed(_) | Self::PeriodAlreadyClosed(_)
        )
    }
}
