//! Fiscal period status per tenant.
//!
//! A period without a row is open. Closing inserts or flips the row to
//! `CLOSED` and writes a `PeriodClosed` outbox row in the same transaction.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, DatabaseConnection, EntityTrait, TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use tally_core::events::LedgerEvent;
use tally_core::ledger::{FiscalPeriod, PeriodStatus};
use tally_shared::types::TenantId;
use tracing::instrument;

use super::error::RepositoryError;
use super::outbox::store_events;
use crate::entities::fiscal_periods;

/// Result of a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The period was open and is now closed.
    Closed,
    /// The period was already closed; nothing was written.
    AlreadyClosed,
}

/// Fiscal period repository.
#[derive(Debug, Clone)]
pub struct FiscalPeriodRepository {
    db: DatabaseConnection,
}

impl FiscalPeriodRepository {
    /// Creates a new fiscal period repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the period's status; `Open` when no row exists.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::DataIntegrity` if the stored status is unknown
    /// - `RepositoryError::Database` if the query fails
    pub async fn get_status(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
    ) -> Result<PeriodStatus, RepositoryError> {
        let row = fiscal_periods::Entity::find_by_id((
            tenant_id.into_inner(),
            period.year(),
            month_column(period),
        ))
        .one(&self.db)
        .await?;

        match row {
            None => Ok(PeriodStatus::Open),
            Some(row) => row.status.parse().map_err(|reason: String| {
                RepositoryError::integrity("fiscal_periods", tenant_id.into_inner(), reason)
            }),
        }
    }

    /// Closes a period and emits `PeriodClosed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; an already closed period is
    /// reported as [`CloseOutcome::AlreadyClosed`], not as an error.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period), err)]
    pub async fn close(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
        now: DateTime<Utc>,
    ) -> Result<CloseOutcome, RepositoryError> {
        let closed = PeriodStatus::Closed.as_str();
        let row = fiscal_periods::ActiveModel {
            tenant_id: Set(tenant_id.into_inner()),
            year: Set(period.year()),
            month: Set(month_column(period)),
            status: Set(closed.to_string()),
            closed_at: Set(Some(now.into())),
        };

        let txn = self.db.begin().await?;
        let affected = fiscal_periods::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    fiscal_periods::Column::TenantId,
                    fiscal_periods::Column::Year,
                    fiscal_periods::Column::Month,
                ])
                .update_columns([fiscal_periods::Column::Status, fiscal_periods::Column::ClosedAt])
                .action_and_where(
                    Expr::col((fiscal_periods::Entity, fiscal_periods::Column::Status)).ne(closed),
                )
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        if affected == 0 {
            tracing::debug!("period already closed");
            return Ok(CloseOutcome::AlreadyClosed);
        }

        store_events(&txn, &[LedgerEvent::period_closed(tenant_id, period, now)]).await?;
        txn.commit().await?;

        tracing::info!("fiscal period closed");
        Ok(CloseOutcome::Closed)
    }
}

// Months are 1..=12, so the cast is lossless.
#[allow(clippy::cast_possible_wrap)]
const fn month_column(period: FiscalPeriod) -> i32 {
    period.month() as i32
}
