//! Outbox Table Writer
//!
//! Co-transactional enqueue of outbound deliveries, invoked by the event
//! store inside its append transaction.

use serde_json::Value;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

/// A delivery queued for the streaming bus.
///
/// Duplicates the event's fields so the relay never joins against the
/// events table. `aggregate_id` rides along for partition keying.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_data: Value,
    pub tenant_id: Uuid,
}

/// Enqueue a delivery inside the caller's transaction.
///
/// The row becomes visible to the relay only when the surrounding append
/// commits; a rollback discards it together with the event rows.
pub async fn enqueue_tx(
    tx: &mut Transaction<'_, Postgres>,
    message: &OutboxMessage,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO outbox (
            event_id, aggregate_id, aggregate_type,
            event_type, event_data, tenant_id
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(message.event_id)
    .bind(message.aggregate_id)
    .bind(&message.aggregate_type)
    .bind(&message.event_type)
    .bind(&message.event_data)
    .bind(message.tenant_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
