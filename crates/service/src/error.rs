//! Use case errors.

use tally_core::ledger::LedgerError;
use tally_db::RepositoryError;

/// Failure of a ledger use case.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Validation or state transition failure. Deterministic.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Persistence failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    /// Stable error code for callers.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.error_code(),
            Self::Repository(e) => e.error_code(),
        }
    }

    /// Whether reloading and retrying the use case may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Ledger(_) => false,
            Self::Repository(e) => e.is_retryable(),
        }
    }

    /// Whether the target aggregate does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::NotFound { .. }))
    }
}
