//! The event trait every bounded context implements.

use chrono::{DateTime, Utc};
use tally_shared::types::{EventId, TenantId};
use uuid::Uuid;

/// A fact emitted by an aggregate.
///
/// Events are immutable, carry their own identity, and serialize to a flat
/// payload that never references in-memory objects.
pub trait DomainEvent: Send + Sync {
    /// Unique id of this event instance. Also the outbox row id.
    fn event_id(&self) -> EventId;

    /// Stable type name, e.g. `ledger.entry.posted`.
    fn event_type(&self) -> &'static str;

    /// Id of the aggregate that emitted the event. Used as the broker
    /// partition key, so events of one aggregate stay ordered.
    fn aggregate_id(&self) -> Uuid;

    /// Aggregate type name, e.g. `JournalEntry`.
    fn aggregate_type(&self) -> &'static str;

    /// Owning tenant.
    fn tenant_id(&self) -> TenantId;

    /// Business time at which the event happened.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Payload schema version. Bump on breaking payload changes.
    fn schema_version(&self) -> u16 {
        1
    }

    /// Serializes the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    fn payload(&self) -> Result<serde_json::Value, serde_json::Error>;
}
