//! Repository error type shared by every ledger repository.

use sea_orm::DbErr;
use uuid::Uuid;

/// Errors raised by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// No row with the given id.
    #[error("{aggregate_type} not found: {id}")]
    NotFound {
        /// Aggregate type name.
        aggregate_type: &'static str,
        /// Requested id.
        id: Uuid,
    },

    /// The stored version did not match the expected one; another writer got
    /// there first. Reload and retry.
    #[error("concurrency conflict on {aggregate_type} {id}: expected stored version {}", version - 1)]
    ConcurrencyConflict {
        /// Aggregate type name.
        aggregate_type: &'static str,
        /// Aggregate id.
        id: Uuid,
        /// Version the caller tried to write.
        version: i64,
    },

    /// A stored row no longer satisfies domain invariants.
    #[error("data integrity violation in {entity} {id}: {reason}")]
    DataIntegrity {
        /// Table or aggregate name.
        entity: &'static str,
        /// Row id.
        id: Uuid,
        /// What was wrong.
        reason: String,
    },

    /// A domain event could not be serialized into the outbox.
    #[error("failed to serialize event {event_id}: {source}")]
    Serialization {
        /// Event id.
        event_id: Uuid,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl RepositoryError {
    /// Returns a stable machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::DataIntegrity { .. } => "DATA_INTEGRITY",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Whether retrying the whole load-modify-save cycle may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    pub(crate) fn integrity(entity: &'static str, id: Uuid, reason: impl ToString) -> Self {
        Self::DataIntegrity {
            entity,
            id,
            reason: reason.to_string(),
        }
    }
}
