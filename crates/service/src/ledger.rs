//! Ledger use cases.
//!
//! Every write loads what it needs, applies the domain transition and
//! persists the result in a single repository call, so state, outbox rows and
//! balance deltas commit or roll back together. Fiscal period checks run
//! before the write.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use tally_core::ledger::{
    AccountBalance, AccountCode, FiscalPeriod, JournalEntry, LedgerError, PeriodStatus,
    posting_deltas, validate_postings,
};
use tally_db::{BalanceRepository, CloseOutcome, FiscalPeriodRepository, JournalEntryRepository};
use tally_relay::OutboxRelay;
use tally_shared::types::{Currency, JournalEntryId, PageRequest, PageResponse, TenantId};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::ServiceError;
use crate::request::NewJournalEntry;

/// Ledger application service.
#[derive(Debug, Clone)]
pub struct LedgerService {
    journal: JournalEntryRepository,
    balances: BalanceRepository,
    periods: FiscalPeriodRepository,
    relay: Option<Arc<OutboxRelay>>,
}

impl LedgerService {
    /// Creates a service over one database.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            journal: JournalEntryRepository::new(db.clone()),
            balances: BalanceRepository::new(db.clone()),
            periods: FiscalPeriodRepository::new(db),
            relay: None,
        }
    }

    /// Runs one relay pass after each successful write.
    ///
    /// Lowers publish latency when the service and the relay share a
    /// process. The pass makes a single broker attempt and never backs off;
    /// the background relay still owns delivery, so a failed pass here is
    /// only logged.
    #[must_use]
    pub fn with_relay(mut self, relay: Arc<OutboxRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Creates and posts an entry in one step.
    ///
    /// # Errors
    ///
    /// - `ServiceError::Ledger` if a posting is invalid or the period is closed
    /// - `ServiceError::Repository` if the write fails
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id), err)]
    pub async fn post_journal_entry(
        &self,
        request: NewJournalEntry,
    ) -> Result<JournalEntry, ServiceError> {
        let now = Utc::now();
        let entry = build_entry(&request, now)?;
        self.ensure_open(entry.tenant_id(), entry.fiscal_period()?)
            .await?;

        let posted = entry.post(now)?;
        self.journal
            .save_all(&[&posted], &posting_deltas(posted.postings()))
            .await?;

        info!(entry_id = %posted.id(), "journal entry posted");
        self.publish_now().await;
        Ok(posted)
    }

    /// Stores a `PENDING` entry. No events, no balance change.
    ///
    /// # Errors
    ///
    /// Same as [`LedgerService::post_journal_entry`].
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id), err)]
    pub async fn create_pending_entry(
        &self,
        request: NewJournalEntry,
    ) -> Result<JournalEntry, ServiceError> {
        let entry = build_entry(&request, Utc::now())?;
        self.ensure_open(entry.tenant_id(), entry.fiscal_period()?)
            .await?;
        self.journal.save(&entry).await?;

        info!(entry_id = %entry.id(), "pending journal entry created");
        Ok(entry)
    }

    /// Posts a stored `PENDING` entry.
    ///
    /// # Errors
    ///
    /// - `ServiceError::Repository` with `NotFound` for an unknown id, or
    ///   `ConcurrencyConflict` if the entry changed since it was loaded
    /// - `ServiceError::Ledger` if the entry is not `PENDING` or its period
    ///   is closed
    #[instrument(skip(self), fields(entry_id = %id), err)]
    pub async fn post_pending_entry(
        &self,
        id: JournalEntryId,
    ) -> Result<JournalEntry, ServiceError> {
        let entry = self.journal.find_by_id(id).await?;
        let posted = entry.post(Utc::now())?;
        self.ensure_open(posted.tenant_id(), posted.fiscal_period()?)
            .await?;

        self.journal
            .save_all(&[&posted], &posting_deltas(posted.postings()))
            .await?;

        info!("pending journal entry posted");
        self.publish_now().await;
        Ok(posted)
    }

    /// Reverses a `POSTED` entry.
    ///
    /// Returns the reversed original and the new reversal entry. Both are
    /// written with the `EntryReversed` outbox row and the reversal's balance
    /// deltas in one transaction.
    ///
    /// # Errors
    ///
    /// - `ServiceError::Repository` for an unknown id or a concurrent change
    /// - `ServiceError::Ledger` if the entry is not `POSTED` or the current
    ///   period is closed
    #[instrument(skip(self, reason), fields(entry_id = %id), err)]
    pub async fn reverse_entry(
        &self,
        id: JournalEntryId,
        reason: &str,
    ) -> Result<(JournalEntry, JournalEntry), ServiceError> {
        let original = self.journal.find_by_id(id).await?;
        let (reversed, reversal) = original.reverse(Utc::now(), reason)?;
        self.ensure_open(reversal.tenant_id(), reversal.fiscal_period()?)
            .await?;

        self.journal
            .save_all(
                &[&reversed, &reversal],
                &posting_deltas(reversal.postings()),
            )
            .await?;

        info!(reversal_id = %reversal.id(), "journal entry reversed");
        self.publish_now().await;
        Ok((reversed, reversal))
    }

    /// Moves a `PENDING` entry to an earlier effective date.
    ///
    /// # Errors
    ///
    /// - `ServiceError::Repository` for an unknown id or a concurrent change
    /// - `ServiceError::Ledger` if the entry is not `PENDING`, the date is in
    ///   the future, or the target period is closed
    #[instrument(skip(self), fields(entry_id = %id, new_date = %new_date), err)]
    pub async fn backvalue_entry(
        &self,
        id: JournalEntryId,
        new_date: NaiveDate,
    ) -> Result<JournalEntry, ServiceError> {
        let entry = self.journal.find_by_id(id).await?;
        let updated = entry.backvalue(new_date, Utc::now())?;
        self.ensure_open(updated.tenant_id(), updated.fiscal_period()?)
            .await?;
        self.journal.save(&updated).await?;

        info!(version = updated.version(), "journal entry back-valued");
        Ok(updated)
    }

    /// Closes a tenant's fiscal period.
    ///
    /// # Errors
    ///
    /// - `ServiceError::Ledger` for an invalid period or one already closed
    /// - `ServiceError::Repository` if the write fails
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn close_period(
        &self,
        tenant_id: TenantId,
        year: i32,
        month: u32,
    ) -> Result<FiscalPeriod, ServiceError> {
        let period = FiscalPeriod::new(year, month)?;
        match self.periods.close(tenant_id, period, Utc::now()).await? {
            CloseOutcome::Closed => {
                info!(period = %period, "fiscal period closed");
                self.publish_now().await;
                Ok(period)
            }
            CloseOutcome::AlreadyClosed => Err(LedgerError::PeriodAlreadyClosed(period).into()),
        }
    }

    /// Loads one entry.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` (see [`ServiceError::is_not_found`]) for an unknown id.
    pub async fn get_entry(&self, id: JournalEntryId) -> Result<JournalEntry, ServiceError> {
        Ok(self.journal.find_by_id(id).await?)
    }

    /// Lists a tenant's entries with an effective date between `from` and
    /// `to`, both inclusive.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_by_tenant(
        &self,
        tenant_id: TenantId,
        from: NaiveDate,
        to: NaiveDate,
        page: PageRequest,
    ) -> Result<PageResponse<JournalEntry>, ServiceError> {
        Ok(self
            .journal
            .list_by_tenant(tenant_id, from, to, page)
            .await?)
    }

    /// Lists a tenant's entries touching `account` between `from` and `to`,
    /// both inclusive.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_by_account(
        &self,
        tenant_id: TenantId,
        account: &AccountCode,
        from: NaiveDate,
        to: NaiveDate,
        page: PageRequest,
    ) -> Result<PageResponse<JournalEntry>, ServiceError> {
        Ok(self
            .journal
            .list_by_account(tenant_id, account, from, to, page)
            .await?)
    }

    /// Current projected balance of one account in one currency.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_balance(
        &self,
        account: &AccountCode,
        currency: Currency,
        as_of: DateTime<Utc>,
    ) -> Result<AccountBalance, ServiceError> {
        Ok(self.balances.get_balance(account, currency, as_of).await?)
    }

    async fn ensure_open(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
    ) -> Result<(), ServiceError> {
        match self.periods.get_status(tenant_id, period).await? {
            PeriodStatus::Open => Ok(()),
            PeriodStatus::Closed => Err(LedgerError::PeriodClosed(period).into()),
        }
    }

    async fn publish_now(&self) {
        let Some(relay) = &self.relay else {
            return;
        };
        if let Err(err) = relay
            .run_once_without_retry(&CancellationToken::new())
            .await
        {
            warn!(error = %err, "in-process relay pass failed, events stay queued");
        }
    }
}

fn build_entry(request: &NewJournalEntry, now: DateTime<Utc>) -> Result<JournalEntry, LedgerError> {
    let postings = request.to_postings()?;
    validate_postings(&postings)?;
    JournalEntry::new_at(
        request.tenant_id,
        request.effective_date,
        postings,
        request.description.clone(),
        request.reference.clone(),
        now,
    )
}
