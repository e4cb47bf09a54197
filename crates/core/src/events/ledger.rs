//! Events emitted by the ledger bounded context.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tally_shared::types::{EventId, JournalEntryId, TenantId};
use uuid::Uuid;

use super::domain_event::DomainEvent;
use crate::ledger::{FiscalPeriod, PostingPair};

/// Aggregate type name for journal entries.
pub const JOURNAL_ENTRY_AGGREGATE: &str = "JournalEntry";
/// Aggregate type name for fiscal periods.
pub const FISCAL_PERIOD_AGGREGATE: &str = "FiscalPeriod";

/// A journal entry moved from `PENDING` to `POSTED`.
///
/// Carries the postings so consumers can replay balances without calling back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPosted {
    /// Event id.
    pub event_id: EventId,
    /// When the entry was posted.
    pub occurred_at: DateTime<Utc>,
    /// The posted entry.
    pub entry_id: JournalEntryId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Effective (value) date of the entry.
    pub effective_date: NaiveDate,
    /// Posting pairs, in order.
    pub postings: Vec<PostingPair>,
}

/// A posted journal entry was reversed by a new reversal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReversed {
    /// Event id.
    pub event_id: EventId,
    /// When the reversal happened.
    pub occurred_at: DateTime<Utc>,
    /// The entry now in `REVERSED` status.
    pub entry_id: JournalEntryId,
    /// The new entry carrying the inverse postings.
    pub reversal_entry_id: JournalEntryId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Reason given by the caller.
    pub reason: String,
}

/// A tenant closed a fiscal period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodClosed {
    /// Event id.
    pub event_id: EventId,
    /// When the period was closed.
    pub occurred_at: DateTime<Utc>,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The closed period, `YYYY-MM`.
    pub period: FiscalPeriod,
}

/// Every event the ledger emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// `ledger.entry.posted`
    EntryPosted(EntryPosted),
    /// `ledger.entry.reversed`
    EntryReversed(EntryReversed),
    /// `ledger.period.closed`
    PeriodClosed(PeriodClosed),
}

impl LedgerEvent {
    /// Builds an `EntryPosted` event with a fresh id.
    #[must_use]
    pub fn entry_posted(
        entry_id: JournalEntryId,
        tenant_id: TenantId,
        effective_date: NaiveDate,
        postings: Vec<PostingPair>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::EntryPosted(EntryPosted {
            event_id: EventId::new(),
            occurred_at,
            entry_id,
            tenant_id,
            effective_date,
            postings,
        })
    }

    /// Builds an `EntryReversed` event with a fresh id.
    #[must_use]
    pub fn entry_reversed(
        entry_id: JournalEntryId,
        reversal_entry_id: JournalEntryId,
        tenant_id: TenantId,
        reason: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::EntryReversed(EntryReversed {
            event_id: EventId::new(),
            occurred_at,
            entry_id,
            reversal_entry_id,
            tenant_id,
            reason: reason.into(),
        })
    }

    /// Builds a `PeriodClosed` event with a fresh id.
    #[must_use]
    pub fn period_closed(
        tenant_id: TenantId,
        period: FiscalPeriod,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::PeriodClosed(PeriodClosed {
            event_id: EventId::new(),
            occurred_at,
            tenant_id,
            period,
        })
    }
}

impl DomainEvent for LedgerEvent {
    fn event_id(&self) -> EventId {
        match self {
            Self::EntryPosted(e) => e.event_id,
            Self::EntryReversed(e) => e.event_id,
            Self::PeriodClosed(e) => e.event_id,
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            Self::EntryPosted(_) => "ledger.entry.posted",
            Self::EntryReversed(_) => "ledger.entry.reversed",
            Self::PeriodClosed(_) => "ledger.period.closed",
        }
    }

    // Period events are keyed by tenant so all closes of one tenant stay ordered.
    fn aggregate_id(&self) -> Uuid {
        match self {
            Self::EntryPosted(e) => e.entry_id.into_inner(),
            Self::EntryReversed(e) => e.entry_id.into_inner(),
            Self::PeriodClosed(e) => e.tenant_id.into_inner(),
        }
    }

    fn aggregate_type(&self) -> &'static str {
        match self {
            Self::EntryPosted(_) | Self::EntryReversed(_) => JOURNAL_ENTRY_AGGREGATE,
            Self::PeriodClosed(_) => FISCAL_PERIOD_AGGREGATE,
        }
    }

    fn tenant_id(&self) -> TenantId {
        match self {
            Self::EntryPosted(e) => e.tenant_id,
            Self::EntryReversed(e) => e.tenant_id,
            Self::PeriodClosed(e) => e.tenant_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::EntryPosted(e) => e.occurred_at,
            Self::EntryReversed(e) => e.occurred_at,
            Self::PeriodClosed(e) => e.occurred_at,
        }
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::EntryPosted(e) => serde_json::to_value(e),
            Self::EntryReversed(e) => serde_json::to_value(e),
            Self::PeriodClosed(e) => serde_json::to_value(e),
        }
    }
}
