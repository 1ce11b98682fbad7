//! Outbox Relay
//!
//! Polling publisher bridging the outbox table and the streaming bus.
//! Claims committed rows in FIFO order, publishes each to its topic, and
//! deletes rows only after broker acknowledgment. Delivery is at-least-once;
//! downstream consumers deduplicate by event id.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Notify;
use tokio::time::interval;
use uuid::Uuid;

use crate::bus::EventPublisher;

/// Backoff between delivery attempts is capped at 5 minutes.
const MAX_BACKOFF_SECS: i64 = 300;

/// Which identifier keys published messages, and therefore which stream the
/// bus partitions by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionKey {
    /// Key by aggregate id: per-aggregate order survives bus partitioning.
    #[default]
    AggregateId,
    /// Key by event id: spreads a hot aggregate across partitions but gives
    /// up cross-event ordering within it.
    EventId,
}

impl std::str::FromStr for PartitionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aggregate_id" => Ok(PartitionKey::AggregateId),
            "event_id" => Ok(PartitionKey::EventId),
            other => Err(format!("unknown partition key: {other}")),
        }
    }
}

/// How rows are claimed from the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimMode {
    /// Plain select; correct for a single-relay deployment.
    #[default]
    Single,
    /// `FOR UPDATE SKIP LOCKED`; each row claimed by at most one worker
    /// when relays are scaled horizontally.
    SkipLocked,
}

impl std::str::FromStr for ClaimMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(ClaimMode::Single),
            "skip_locked" => Ok(ClaimMode::SkipLocked),
            other => Err(format!("unknown claim mode: {other}")),
        }
    }
}

/// Relay tuning knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum rows processed per invocation
    pub batch_size: i64,
    /// Attempts after which a row is dead-lettered and skipped
    pub max_attempts: i32,
    pub partition_key: PartitionKey,
    pub claim_mode: ClaimMode,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 10,
            partition_key: PartitionKey::default(),
            claim_mode: ClaimMode::default(),
        }
    }
}

/// Relay execution errors. Per-row publish failures are not errors at this
/// level: they are logged, recorded on the row, and retried later.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Forwards committed outbox rows to the streaming bus.
pub struct OutboxRelay<P> {
    pool: PgPool,
    publisher: P,
    config: RelayConfig,
}

impl<P: EventPublisher> OutboxRelay<P> {
    /// Create a relay with default tuning.
    pub fn new(pool: PgPool, publisher: P) -> Self {
        Self::with_config(pool, publisher, RelayConfig::default())
    }

    /// Create a relay with explicit tuning.
    pub fn with_config(pool: PgPool, publisher: P, config: RelayConfig) -> Self {
        Self {
            pool,
            publisher,
            config,
        }
    }

    /// Process one batch of pending deliveries.
    ///
    /// Rows are attempted oldest-first. A failing row is marked
    /// (`attempts`, `last_error`, `last_attempt_at`) and the batch moves on,
    /// so one poisoned row never blocks the rows behind it. Deletes commit
    /// together at batch end; a crash before commit republishes the batch,
    /// which downstream deduplication absorbs.
    ///
    /// Returns the number of successfully published rows.
    pub async fn process_batch(&self) -> Result<u32, RelayError> {
        let mut tx = self.pool.begin().await?;

        let rows = self.claim_batch(&mut tx).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let mut published = 0u32;
        for row in rows {
            let topic = topic_for(&row.aggregate_type);
            let key = match self.config.partition_key {
                PartitionKey::AggregateId => row.aggregate_id,
                PartitionKey::EventId => row.event_id,
            }
            .to_string();

            let payload = match serde_json::to_vec(&row.event_data) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::error!(
                        outbox_id = row.id,
                        event_id = %row.event_id,
                        error = %err,
                        "Outbox payload is not serializable"
                    );
                    Self::mark_failed(&mut tx, row.id, &err.to_string()).await?;
                    continue;
                }
            };

            match self
                .publisher
                .publish(&topic, key.as_bytes(), &payload)
                .await
            {
                Ok(()) => {
                    sqlx::query("DELETE FROM outbox WHERE id = $1")
                        .bind(row.id)
                        .execute(&mut *tx)
                        .await?;
                    published += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        outbox_id = row.id,
                        event_id = %row.event_id,
                        event_type = %row.event_type,
                        tenant_id = %row.tenant_id,
                        topic = %topic,
                        attempts = row.attempts + 1,
                        error = %err,
                        "Outbox publish failed; row retained for retry"
                    );
                    Self::mark_failed(&mut tx, row.id, &err.to_string()).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(published)
    }

    /// Count rows that exceeded `max_attempts` and await manual intervention.
    pub async fn dead_letter_count(&self) -> Result<i64, RelayError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE attempts >= $1")
            .bind(self.config.max_attempts)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Claim up to `batch_size` live rows in FIFO order.
    ///
    /// Live means: under the attempt cap and past the exponential backoff
    /// deadline (`min(2^attempts, 300)` seconds since the last failure).
    async fn claim_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Vec<OutboxRow>, RelayError> {
        let sql = match self.config.claim_mode {
            ClaimMode::Single => CLAIM_SQL,
            ClaimMode::SkipLocked => CLAIM_SQL_SKIP_LOCKED,
        };

        let rows: Vec<(i64, Uuid, Uuid, String, String, Value, Uuid, i32)> = sqlx::query_as(sql)
            .bind(self.config.max_attempts)
            .bind(MAX_BACKOFF_SECS)
            .bind(self.config.batch_size)
            .fetch_all(&mut **tx)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, event_id, aggregate_id, aggregate_type, event_type, event_data, tenant_id, attempts)| {
                    OutboxRow {
                        id,
                        event_id,
                        aggregate_id,
                        aggregate_type,
                        event_type,
                        event_data,
                        tenant_id,
                        attempts,
                    }
                },
            )
            .collect())
    }

    async fn mark_failed(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        error: &str,
    ) -> Result<(), RelayError> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET attempts = attempts + 1, last_error = $2, last_attempt_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

const CLAIM_SQL: &str = r#"
    SELECT id, event_id, aggregate_id, aggregate_type, event_type, event_data, tenant_id, attempts
    FROM outbox
    WHERE attempts < $1
      AND (last_attempt_at IS NULL
           OR last_attempt_at + make_interval(secs => LEAST($2, power(2, attempts))) <= NOW())
    ORDER BY created_at ASC, id ASC
    LIMIT $3
"#;

const CLAIM_SQL_SKIP_LOCKED: &str = r#"
    SELECT id, event_id, aggregate_id, aggregate_type, event_type, event_data, tenant_id, attempts
    FROM outbox
    WHERE attempts < $1
      AND (last_attempt_at IS NULL
           OR last_attempt_at + make_interval(secs => LEAST($2, power(2, attempts))) <= NOW())
    ORDER BY created_at ASC, id ASC
    LIMIT $3
    FOR UPDATE SKIP LOCKED
"#;

/// One claimed delivery.
#[derive(Debug)]
struct OutboxRow {
    id: i64,
    event_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    event_type: String,
    event_data: Value,
    tenant_id: Uuid,
    attempts: i32,
}

/// Derive the bus topic from the stream family.
pub fn topic_for(aggregate_type: &str) -> String {
    format!("finance.{}.events", aggregate_type.to_lowercase())
}

/// Drives the relay: one `process_batch` per poll interval, plus an
/// immediate run whenever the event store signals a committed append.
pub struct RelayScheduler<P> {
    relay: OutboxRelay<P>,
    poll_interval: Duration,
    wake: Arc<Notify>,
}

impl<P: EventPublisher + 'static> RelayScheduler<P> {
    pub fn new(relay: OutboxRelay<P>, poll_interval: Duration, wake: Arc<Notify>) -> Self {
        Self {
            relay,
            poll_interval,
            wake,
        }
    }

    /// Start the scheduler in the background.
    /// Returns a handle that can be used to abort it; an aborted iteration
    /// rolls back its claim transaction.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Outbox relay started"
        );

        let mut tick = interval(self.poll_interval);
        let mut known_dead_letters: i64 = 0;

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = self.wake.notified() => {}
            }

            match self.relay.process_batch().await {
                Ok(0) => {}
                Ok(count) => {
                    tracing::info!(published = count, "Outbox batch published");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Outbox processing failed");
                }
            }

            match self.relay.dead_letter_count().await {
                Ok(count) if count > known_dead_letters => {
                    tracing::warn!(
                        dead_letters = count,
                        "Outbox rows exceeded max delivery attempts; manual intervention required"
                    );
                    known_dead_letters = count;
                }
                Ok(count) => known_dead_letters = count,
                Err(e) => {
                    tracing::error!(error = %e, "Dead letter check failed");
                }
            }
        }
    }
}
