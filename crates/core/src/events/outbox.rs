//! Outbox rows: the at-rest form of a domain event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_shared::types::{EventId, TenantId};
use uuid::Uuid;

use super::domain_event::DomainEvent;

/// A domain event waiting in (or already relayed from) the outbox table.
///
/// Created unpublished in the same transaction as the aggregate write;
/// `published_at` is set only after the broker acknowledged the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Event id, also the row id.
    pub id: EventId,
    /// Aggregate that emitted the event.
    pub aggregate_id: Uuid,
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Event type name.
    pub event_type: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Payload schema version.
    pub schema_version: u16,
    /// JSON-encoded payload.
    pub payload: String,
    /// When the event occurred; doubles as the relay ordering key.
    pub created_at: DateTime<Utc>,
    /// When the broker acknowledged delivery. `None` while pending.
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Marshals a domain event into an unpublished outbox row.
    ///
    /// # Errors
    ///
    /// Returns an error if the event payload cannot be serialized.
    pub fn from_event(event: &dyn DomainEvent) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_string(&event.payload()?)?;
        Ok(Self {
            id: event.event_id(),
            aggregate_id: event.aggregate_id(),
            aggregate_type: event.aggregate_type().to_string(),
            event_type: event.event_type().to_string(),
            tenant_id: event.tenant_id(),
            schema_version: event.schema_version(),
            payload,
            created_at: event.occurred_at(),
            published_at: None,
        })
    }

    /// Returns true once the broker has acknowledged this entry.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        self.published_at.is_some()
    }
}
