//! Transactional outbox storage.
//!
//! Rows are written by the aggregate repositories inside their own
//! transactions (see [`store_events`]) and drained by the relay through the
//! [`OutboxStore`] trait. Rows the relay can never deliver are dead-lettered:
//! they keep their payload, get `dead_lettered_at` and `last_error`, and are
//! skipped by later fetches until requeued.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::Expr,
};
use tally_core::events::{DomainEvent, OutboxEntry};
use tally_shared::types::{EventId, TenantId};

use super::error::RepositoryError;
use crate::entities::outbox;

/// Read and acknowledge side of the outbox, as seen by the relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `limit` unpublished, not dead-lettered entries, oldest
    /// first.
    async fn fetch_unpublished(&self, limit: u64) -> Result<Vec<OutboxEntry>, RepositoryError>;

    /// Stamps `published_at` on the given entries. Entries already published
    /// are left untouched. Returns the number of rows stamped.
    async fn mark_published(
        &self,
        ids: &[EventId],
        published_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Takes an entry out of delivery, recording why. Published or already
    /// dead-lettered entries are left untouched. Returns the number of rows
    /// marked.
    async fn mark_dead_lettered(
        &self,
        id: EventId,
        reason: &str,
        dead_lettered_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
}

/// Outbox repository.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    db: DatabaseConnection,
}

impl OutboxRepository {
    /// Creates a new outbox repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts already-marshalled entries on `conn`, which is normally an open
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn store_in<C: ConnectionTrait>(
        conn: &C,
        entries: &[OutboxEntry],
    ) -> Result<(), RepositoryError> {
        if entries.is_empty() {
            return Ok(());
        }
        let models = entries
            .iter()
            .map(to_active_model)
            .collect::<Result<Vec<_>, _>>()?;
        outbox::Entity::insert_many(models)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    /// Counts entries still waiting for the relay. Dead-lettered entries are
    /// not counted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_unpublished(&self) -> Result<u64, RepositoryError> {
        let count = outbox::Entity::find()
            .filter(outbox::Column::PublishedAt.is_null())
            .filter(outbox::Column::DeadLetteredAt.is_null())
            .count(&self.db)
            .await?;
        Ok(count)
    }

    /// Counts dead-lettered entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_dead_lettered(&self) -> Result<u64, RepositoryError> {
        let count = outbox::Entity::find()
            .filter(outbox::Column::DeadLetteredAt.is_not_null())
            .count(&self.db)
            .await?;
        Ok(count)
    }

    /// Returns the recorded failure of a dead-lettered entry, or `None` if
    /// the entry is not dead-lettered.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or an error if the query fails.
    pub async fn dead_letter_reason(&self, id: EventId) -> Result<Option<String>, RepositoryError> {
        let model = outbox::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await?
            .ok_or(RepositoryError::NotFound {
                aggregate_type: "OutboxEntry",
                id: id.into_inner(),
            })?;
        Ok(model.dead_lettered_at.and(model.last_error))
    }

    /// Puts dead-lettered entries back into delivery, clearing the recorded
    /// failure. Returns the number of rows requeued.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn requeue_dead_lettered(&self, ids: &[EventId]) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = outbox::Entity::update_many()
            .col_expr(
                outbox::Column::DeadLetteredAt,
                Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
            )
            .col_expr(outbox::Column::LastError, Expr::value(Option::<String>::None))
            .filter(outbox::Column::Id.is_in(ids.iter().map(|id| id.into_inner())))
            .filter(outbox::Column::DeadLetteredAt.is_not_null())
            .exec(&self.db)
            .await?;

        tracing::info!(requeued = result.rows_affected, "requeued dead-lettered outbox rows");
        Ok(result.rows_affected)
    }

    /// Lists every entry, published or not, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is malformed.
    pub async fn list_all(&self) -> Result<Vec<OutboxEntry>, RepositoryError> {
        outbox::Entity::find()
            .order_by_asc(outbox::Column::CreatedAt)
            .order_by_asc(outbox::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(from_model)
            .collect()
    }

    /// Deletes published entries acknowledged before `older_than`.
    ///
    /// Unpublished entries are never purged.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn purge_published(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let cutoff: sea_orm::prelude::DateTimeWithTimeZone = older_than.into();
        let result = outbox::Entity::delete_many()
            .filter(outbox::Column::PublishedAt.is_not_null())
            .filter(outbox::Column::PublishedAt.lt(cutoff))
            .exec(&self.db)
            .await?;

        tracing::debug!(purged = result.rows_affected, "purged published outbox rows");
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl OutboxStore for OutboxRepository {
    async fn fetch_unpublished(&self, limit: u64) -> Result<Vec<OutboxEntry>, RepositoryError> {
        outbox::Entity::find()
            .filter(outbox::Column::PublishedAt.is_null())
            .filter(outbox::Column::DeadLetteredAt.is_null())
            .order_by_asc(outbox::Column::CreatedAt)
            .order_by_asc(outbox::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(from_model)
            .collect()
    }

    async fn mark_published(
        &self,
        ids: &[EventId],
        published_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let stamp: sea_orm::prelude::DateTimeWithTimeZone = published_at.into();
        let result = outbox::Entity::update_many()
            .col_expr(outbox::Column::PublishedAt, Expr::value(stamp))
            .filter(outbox::Column::Id.is_in(ids.iter().map(|id| id.into_inner())))
            .filter(outbox::Column::PublishedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn mark_dead_lettered(
        &self,
        id: EventId,
        reason: &str,
        dead_lettered_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let stamp: sea_orm::prelude::DateTimeWithTimeZone = dead_lettered_at.into();
        let result = outbox::Entity::update_many()
            .col_expr(outbox::Column::DeadLetteredAt, Expr::value(stamp))
            .col_expr(outbox::Column::LastError, Expr::value(reason.to_string()))
            .filter(outbox::Column::Id.eq(id.into_inner()))
            .filter(outbox::Column::PublishedAt.is_null())
            .filter(outbox::Column::DeadLetteredAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

/// Marshals `events` and writes them to the outbox on `conn`.
pub(crate) async fn store_events<C, E>(conn: &C, events: &[E]) -> Result<(), RepositoryError>
where
    C: ConnectionTrait,
    E: DomainEvent,
{
    let entries = events
        .iter()
        .map(|event| {
            OutboxEntry::from_event(event).map_err(|source| RepositoryError::Serialization {
                event_id: event.event_id().into_inner(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    OutboxRepository::store_in(conn, &entries).await
}

fn to_active_model(entry: &OutboxEntry) -> Result<outbox::ActiveModel, RepositoryError> {
    let schema_version = i16::try_from(entry.schema_version).map_err(|_| {
        RepositoryError::integrity(
            "outbox",
            entry.id.into_inner(),
            format!("schema version {} out of range", entry.schema_version),
        )
    })?;
    Ok(outbox::ActiveModel {
        id: Set(entry.id.into_inner()),
        aggregate_id: Set(entry.aggregate_id),
        aggregate_type: Set(entry.aggregate_type.clone()),
        event_type: Set(entry.event_type.clone()),
        tenant_id: Set(entry.tenant_id.into_inner()),
        schema_version: Set(schema_version),
        payload: Set(entry.payload.clone()),
        created_at: Set(entry.created_at.into()),
        published_at: Set(entry.published_at.map(Into::into)),
        dead_lettered_at: Set(None),
        last_error: Set(None),
    })
}

fn from_model(model: outbox::Model) -> Result<OutboxEntry, RepositoryError> {
    let schema_version = u16::try_from(model.schema_version).map_err(|_| {
        RepositoryError::integrity(
            "outbox",
            model.id,
            format!("negative schema version {}", model.schema_version),
        )
    })?;
    Ok(OutboxEntry {
        id: EventId::from_uuid(model.id),
        aggregate_id: model.aggregate_id,
        aggregate_type: model.aggregate_type,
        event_type: model.event_type,
        tenant_id: TenantId::from_uuid(model.tenant_id),
        schema_version,
        payload: model.payload,
        created_at: model.created_at.with_timezone(&Utc),
        published_at: model.published_at.map(|ts| ts.with_timezone(&Utc)),
    })
}
