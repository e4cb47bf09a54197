//! Journal entry repository.
//!
//! `save` is the only write path. Within one transaction it:
//! 1. upserts the entry row, gated on the stored version being `version - 1`
//! 2. replaces the entry's posting rows
//! 3. writes one outbox row per buffered domain event
//!
//! An upsert that touches no row means another writer committed first and
//! surfaces as [`RepositoryError::ConcurrencyConflict`].

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, TransactionTrait,
    sea_query::{Expr, OnConflict, Query},
};
use tally_core::events::JOURNAL_ENTRY_AGGREGATE;
use tally_core::ledger::{
    AccountCode, BalanceDelta, EntryStatus, JournalEntry, JournalEntryRecord, PostingPair,
};
use tally_shared::types::{JournalEntryId, PageRequest, PageResponse, TenantId};
use tracing::instrument;
use uuid::Uuid;

use super::balance::BalanceRepository;
use super::error::RepositoryError;
use super::outbox::store_events;
use crate::entities::{journal_entries, posting_pairs};

/// Journal entry repository.
#[derive(Debug, Clone)]
pub struct JournalEntryRepository {
    db: DatabaseConnection,
}

impl JournalEntryRepository {
    /// Creates a new journal entry repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Persists an entry together with its buffered events.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::ConcurrencyConflict` if the stored version is not
    ///   `entry.version() - 1`
    /// - `RepositoryError::Serialization` if an event cannot be marshalled
    /// - `RepositoryError::Database` on any database failure
    #[instrument(skip(self, entry), fields(entry_id = %entry.id(), version = entry.version()), err)]
    pub async fn save(&self, entry: &JournalEntry) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;
        save_entry(&txn, entry).await?;
        txn.commit().await?;

        tracing::debug!(events = entry.domain_events().len(), "journal entry saved");
        Ok(())
    }

    /// Persists several entries and applies balance deltas atomically.
    ///
    /// Used for transitions that touch more than one aggregate (a reversal
    /// writes the original and its reversal entry) or that move balances.
    ///
    /// # Errors
    ///
    /// Same as [`JournalEntryRepository::save`]; nothing is written if any
    /// entry conflicts.
    #[instrument(skip_all, fields(entries = entries.len(), deltas = deltas.len()), err)]
    pub async fn save_all(
        &self,
        entries: &[&JournalEntry],
        deltas: &[BalanceDelta],
    ) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;
        for entry in entries {
            save_entry(&txn, entry).await?;
        }
        BalanceRepository::apply_deltas_in(&txn, deltas, Utc::now()).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Loads an entry and its postings.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::NotFound` if no entry has this id
    /// - `RepositoryError::DataIntegrity` if a stored row fails validation
    pub async fn find_by_id(&self, id: JournalEntryId) -> Result<JournalEntry, RepositoryError> {
        let txn = self.db.begin().await?;
        let model = journal_entries::Entity::find_by_id(id.into_inner())
            .one(&txn)
            .await?
            .ok_or(RepositoryError::NotFound {
                aggregate_type: JOURNAL_ENTRY_AGGREGATE,
                id: id.into_inner(),
            })?;
        let postings = posting_pairs::Entity::find()
            .filter(posting_pairs::Column::EntryId.eq(model.id))
            .order_by_asc(posting_pairs::Column::SeqNum)
            .all(&txn)
            .await?;
        txn.commit().await?;

        hydrate(model, postings)
    }

    /// Lists a tenant's entries with an effective date in `[from, to]`,
    /// ordered by effective date.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails validation.
    pub async fn list_by_tenant(
        &self,
        tenant_id: TenantId,
        from: NaiveDate,
        to: NaiveDate,
        page: PageRequest,
    ) -> Result<PageResponse<JournalEntry>, RepositoryError> {
        let query = journal_entries::Entity::find()
            .filter(journal_entries::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(journal_entries::Column::EffectiveDate.between(from, to));
        self.fetch_page(query, page).await
    }

    /// Lists a tenant's entries that debit or credit `account` with an
    /// effective date in `[from, to]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails validation.
    pub async fn list_by_account(
        &self,
        tenant_id: TenantId,
        account: &AccountCode,
        from: NaiveDate,
        to: NaiveDate,
        page: PageRequest,
    ) -> Result<PageResponse<JournalEntry>, RepositoryError> {
        let touching_account = Query::select()
            .column(posting_pairs::Column::EntryId)
            .from(posting_pairs::Entity)
            .cond_where(
                Condition::any()
                    .add(posting_pairs::Column::DebitAccount.eq(account.as_str()))
                    .add(posting_pairs::Column::CreditAccount.eq(account.as_str())),
            )
            .to_owned();

        let query = journal_entries::Entity::find()
            .filter(journal_entries::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(journal_entries::Column::EffectiveDate.between(from, to))
            .filter(journal_entries::Column::Id.in_subquery(touching_account));
        self.fetch_page(query, page).await
    }

    async fn fetch_page(
        &self,
        query: Select<journal_entries::Entity>,
        page: PageRequest,
    ) -> Result<PageResponse<JournalEntry>, RepositoryError> {
        let total = query.clone().count(&self.db).await?;

        let models = query
            .order_by_asc(journal_entries::Column::EffectiveDate)
            .order_by_asc(journal_entries::Column::CreatedAt)
            .order_by_asc(journal_entries::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await?;

        let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
        let mut postings_by_entry: HashMap<Uuid, Vec<posting_pairs::Model>> = HashMap::new();
        if !ids.is_empty() {
            let postings = posting_pairs::Entity::find()
                .filter(posting_pairs::Column::EntryId.is_in(ids))
                .order_by_asc(posting_pairs::Column::EntryId)
                .order_by_asc(posting_pairs::Column::SeqNum)
                .all(&self.db)
                .await?;
            for posting in postings {
                postings_by_entry
                    .entry(posting.entry_id)
                    .or_default()
                    .push(posting);
            }
        }

        let entries = models
            .into_iter()
            .map(|model| {
                let postings = postings_by_entry.remove(&model.id).unwrap_or_default();
                hydrate(model, postings)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageResponse::new(entries, page, total))
    }
}

/// Writes one entry on `conn` without committing.
async fn save_entry<C: ConnectionTrait>(
    conn: &C,
    entry: &JournalEntry,
) -> Result<(), RepositoryError> {
    let id = entry.id().into_inner();
    let row = journal_entries::ActiveModel {
        id: Set(id),
        tenant_id: Set(entry.tenant_id().into_inner()),
        effective_date: Set(entry.effective_date()),
        status: Set(entry.status().as_str().to_string()),
        description: Set(entry.description().to_string()),
        reference: Set(entry.reference().to_string()),
        version: Set(entry.version()),
        created_at: Set(entry.created_at().into()),
        updated_at: Set(entry.updated_at().into()),
    };

    let affected = journal_entries::Entity::insert(row)
        .on_conflict(
            OnConflict::column(journal_entries::Column::Id)
                .update_columns([
                    journal_entries::Column::Status,
                    journal_entries::Column::EffectiveDate,
                    journal_entries::Column::Description,
                    journal_entries::Column::Reference,
                    journal_entries::Column::Version,
                    journal_entries::Column::UpdatedAt,
                ])
                .action_and_where(
                    Expr::col((journal_entries::Entity, journal_entries::Column::Version))
                        .eq(entry.version() - 1),
                )
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    if affected == 0 {
        tracing::warn!(entry_id = %id, version = entry.version(), "stale journal entry version");
        return Err(RepositoryError::ConcurrencyConflict {
            aggregate_type: JOURNAL_ENTRY_AGGREGATE,
            id,
            version: entry.version(),
        });
    }

    posting_pairs::Entity::delete_many()
        .filter(posting_pairs::Column::EntryId.eq(id))
        .exec(conn)
        .await?;

    let rows = entry
        .postings()
        .iter()
        .zip(1..)
        .map(|(pair, seq_num)| posting_pairs::ActiveModel {
            entry_id: Set(id),
            seq_num: Set(seq_num),
            debit_account: Set(pair.debit_account().as_str().to_string()),
            credit_account: Set(pair.credit_account().as_str().to_string()),
            amount: Set(pair.amount()),
            currency: Set(pair.currency().as_str().to_string()),
            description: Set(pair.description().to_string()),
        })
        .collect::<Vec<_>>();
    if !rows.is_empty() {
        posting_pairs::Entity::insert_many(rows)
            .exec_without_returning(conn)
            .await?;
    }

    store_events(conn, entry.domain_events()).await
}

/// Rebuilds an entry from its rows, re-validating every value object.
fn hydrate(
    model: journal_entries::Model,
    postings: Vec<posting_pairs::Model>,
) -> Result<JournalEntry, RepositoryError> {
    let id = model.id;
    let corrupt = |reason: String| RepositoryError::integrity("journal_entries", id, reason);

    let status: EntryStatus = model.status.parse().map_err(corrupt)?;
    if postings.is_empty() {
        return Err(corrupt("entry has no postings".to_string()));
    }

    let postings = postings
        .into_iter()
        .map(|row| {
            let debit = AccountCode::new(&row.debit_account)?;
            let credit = AccountCode::new(&row.credit_account)?;
            PostingPair::new(debit, credit, row.amount, &row.currency, row.description)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| corrupt(format!("invalid posting: {e}")))?;

    Ok(JournalEntry::reconstruct(JournalEntryRecord {
        id: JournalEntryId::from_uuid(id),
        tenant_id: TenantId::from_uuid(model.tenant_id),
        effective_date: model.effective_date,
        postings,
        status,
        description: model.description,
        reference: model.reference,
        version: model.version,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }))
}
