//! The `JournalEntry` aggregate and its `PENDING -> POSTED -> REVERSED`
//! state machine.
//!
//! Every transition takes `&self` and returns a new entry, so a loaded entry
//! can be shared between readers without locking. Persistence and conflict
//! detection live in the repository; this module does no I/O.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tally_shared::types::{JournalEntryId, TenantId};

use super::error::LedgerError;
use super::fiscal_period::FiscalPeriod;
use super::posting_pair::PostingPair;
use crate::aggregate::Aggregate;
use crate::events::{JOURNAL_ENTRY_AGGREGATE, LedgerEvent};

/// Lifecycle status of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    /// Created, not yet affecting balances. May be re-dated.
    Pending,
    /// Affects balances. Postings are frozen.
    Posted,
    /// Cancelled by a reversal entry.
    Reversed,
}

impl EntryStatus {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Posted => "POSTED",
            Self::Reversed => "REVERSED",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "POSTED" => Ok(Self::Posted),
            "REVERSED" => Ok(Self::Reversed),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

/// Persisted fields of a journal entry, used to rebuild it without
/// validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntryRecord {
    /// Entry id.
    pub id: JournalEntryId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Effective (value) date.
    pub effective_date: NaiveDate,
    /// Posting pairs in sequence order.
    pub postings: Vec<PostingPair>,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// Entry description.
    pub description: String,
    /// External reference.
    pub reference: String,
    /// Optimistic-concurrency version.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

/// A double-entry journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    id: JournalEntryId,
    tenant_id: TenantId,
    effective_date: NaiveDate,
    postings: Vec<PostingPair>,
    status: EntryStatus,
    description: String,
    reference: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    pending_events: Vec<LedgerEvent>,
}

// Stored timestamps have microsecond precision.
fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

impl JournalEntry {
    /// Creates a `PENDING` entry at version 1 with no events.
    ///
    /// # Errors
    ///
    /// - `LedgerError::MissingTenant` for a nil tenant id
    /// - `LedgerError::InvalidEffectiveDate` if no fiscal period contains the date
    /// - `LedgerError::NoPostings` for an empty posting list
    pub fn new(
        tenant_id: TenantId,
        effective_date: NaiveDate,
        postings: Vec<PostingPair>,
        description: impl Into<String>,
        reference: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        Self::new_at(
            tenant_id,
            effective_date,
            postings,
            description,
            reference,
            Utc::now(),
        )
    }

    /// Like [`JournalEntry::new`] with an explicit creation time.
    pub fn new_at(
        tenant_id: TenantId,
        effective_date: NaiveDate,
        postings: Vec<PostingPair>,
        description: impl Into<String>,
        reference: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if tenant_id.is_nil() {
            return Err(LedgerError::MissingTenant);
        }
        if FiscalPeriod::from_date(effective_date).is_err() {
            return Err(LedgerError::InvalidEffectiveDate(effective_date));
        }
        if postings.is_empty() {
            return Err(LedgerError::NoPostings);
        }

        let now = truncate(now);
        Ok(Self {
            id: JournalEntryId::new(),
            tenant_id,
            effective_date,
            postings,
            status: EntryStatus::Pending,
            description: description.into(),
            reference: reference.into(),
            version: 1,
            created_at: now,
            updated_at: now,
            pending_events: Vec::new(),
        })
    }

    /// Rebuilds an entry from storage: no validation, no events.
    #[must_use]
    pub fn reconstruct(record: JournalEntryRecord) -> Self {
        Self {
            id: record.id,
            tenant_id: record.tenant_id,
            effective_date: record.effective_date,
            postings: record.postings,
            status: record.status,
            description: record.description,
            reference: record.reference,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
            pending_events: Vec::new(),
        }
    }

    /// Posts a `PENDING` entry.
    ///
    /// Returns a copy in `POSTED` with `version + 1` and an `EntryPosted`
    /// event appended.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidTransition` unless the entry is `PENDING`.
    pub fn post(&self, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        self.require(EntryStatus::Pending, "post")?;
        let now = truncate(now);

        let mut posted = self.clone();
        posted.status = EntryStatus::Posted;
        posted.version += 1;
        posted.updated_at = now;
        posted.pending_events.push(LedgerEvent::entry_posted(
            self.id,
            self.tenant_id,
            self.effective_date,
            self.postings.clone(),
            now,
        ));
        Ok(posted)
    }

    /// Reverses a `POSTED` entry.
    ///
    /// Returns `(reversed, reversal)`: the original in `REVERSED` with
    /// `version + 1` and an `EntryReversed` event, and a new `POSTED` entry at
    /// version 1, dated `now`, whose pairs are the inverses of the original's
    /// and whose reference is the original id.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidTransition` unless the entry is `POSTED`.
    pub fn reverse(&self, now: DateTime<Utc>, reason: &str) -> Result<(Self, Self), LedgerError> {
        self.require(EntryStatus::Posted, "reverse")?;
        let now = truncate(now);

        let reversal = Self {
            id: JournalEntryId::new(),
            tenant_id: self.tenant_id,
            effective_date: now.date_naive(),
            postings: self
                .postings
                .iter()
                .map(|p| p.inverse(format!("Reversal: {}", p.description())))
                .collect(),
            status: EntryStatus::Posted,
            description: format!("Reversal of {}: {reason}", self.id),
            reference: self.id.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            pending_events: Vec::new(),
        };

        let mut reversed = self.clone();
        reversed.status = EntryStatus::Reversed;
        reversed.version += 1;
        reversed.updated_at = now;
        reversed.pending_events.push(LedgerEvent::entry_reversed(
            self.id,
            reversal.id,
            self.tenant_id,
            reason,
            now,
        ));

        Ok((reversed, reversal))
    }

    /// Re-dates a `PENDING` entry. Emits no event.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidTransition` unless the entry is `PENDING`
    /// - `LedgerError::FutureEffectiveDate` if `new_date` is after `now`'s date
    /// - `LedgerError::InvalidEffectiveDate` if no fiscal period contains `new_date`
    pub fn backvalue(&self, new_date: NaiveDate, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        self.require(EntryStatus::Pending, "backvalue")?;
        let today = now.date_naive();
        if new_date > today {
            return Err(LedgerError::FutureEffectiveDate {
                date: new_date,
                today,
            });
        }
        if FiscalPeriod::from_date(new_date).is_err() {
            return Err(LedgerError::InvalidEffectiveDate(new_date));
        }

        let mut updated = self.clone();
        updated.effective_date = new_date;
        updated.version += 1;
        updated.updated_at = truncate(now);
        Ok(updated)
    }

    fn require(&self, required: EntryStatus, operation: &'static str) -> Result<(), LedgerError> {
        if self.status == required {
            Ok(())
        } else {
            Err(LedgerError::InvalidTransition {
                entry_id: self.id,
                operation,
                required,
                actual: self.status,
            })
        }
    }

    /// Entry id.
    #[must_use]
    pub const fn id(&self) -> JournalEntryId {
        self.id
    }

    /// Owning tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Effective (value) date.
    #[must_use]
    pub const fn effective_date(&self) -> NaiveDate {
        self.effective_date
    }

    /// Fiscal period of the effective date.
    ///
    /// # Errors
    ///
    /// Only fails for reconstructed entries whose date is outside the
    /// supported range.
    pub fn fiscal_period(&self) -> Result<FiscalPeriod, LedgerError> {
        FiscalPeriod::from_date(self.effective_date)
    }

    /// Posting pairs in order.
    #[must_use]
    pub fn postings(&self) -> &[PostingPair] {
        &self.postings
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> EntryStatus {
        self.status
    }

    /// Entry description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// External reference. For reversal entries, the reversed entry's id.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Optimistic-concurrency version.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last transition time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Events produced since creation or load.
    #[must_use]
    pub fn domain_events(&self) -> &[LedgerEvent] {
        &self.pending_events
    }
}

impl Aggregate for JournalEntry {
    type Id = JournalEntryId;
    type Event = LedgerEvent;

    const AGGREGATE_TYPE: &'static str = JOURNAL_ENTRY_AGGREGATE;

    fn id(&self) -> JournalEntryId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn pending_events(&self) -> &[LedgerEvent] {
        &self.pending_events
    }

    fn without_events(&self) -> Self {
        let mut copy = self.clone();
        copy.pending_events.clear();
        copy
    }
}
