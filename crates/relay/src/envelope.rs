//! Wire form of an outbox row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::events::OutboxEntry;
use uuid::Uuid;

use crate::broker::Message;

/// JSON envelope published as the message value.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    event_id: Uuid,
    event_type: &'a str,
    aggregate_id: Uuid,
    aggregate_type: &'a str,
    tenant_id: Uuid,
    occurred_at: DateTime<Utc>,
    schema_version: u16,
    payload: serde_json::Value,
}

/// Builds the broker message for an outbox row.
///
/// The key is the aggregate id so one aggregate's events stay ordered. The
/// stored payload is embedded as JSON, not as an escaped string.
///
/// # Errors
///
/// Returns an error if the stored payload is not valid JSON.
pub fn to_message(entry: &OutboxEntry) -> Result<Message, serde_json::Error> {
    let envelope = Envelope {
        event_id: entry.id.into_inner(),
        event_type: &entry.event_type,
        aggregate_id: entry.aggregate_id,
        aggregate_type: &entry.aggregate_type,
        tenant_id: entry.tenant_id.into_inner(),
        occurred_at: entry.created_at,
        schema_version: entry.schema_version,
        payload: serde_json::from_str(&entry.payload)?,
    };

    let headers = BTreeMap::from([
        ("event_id".to_string(), entry.id.to_string()),
        ("event_type".to_string(), entry.event_type.clone()),
        ("aggregate_id".to_string(), entry.aggregate_id.to_string()),
        ("aggregate_type".to_string(), entry.aggregate_type.clone()),
        ("tenant_id".to_string(), entry.tenant_id.to_string()),
        ("occurred_at".to_string(), entry.created_at.to_rfc3339()),
        ("schema_version".to_string(), entry.schema_version.to_string()),
    ]);

    Ok(Message {
        key: entry.aggregate_id.to_string(),
        payload: serde_json::to_vec(&envelope)?,
        headers,
    })
}
