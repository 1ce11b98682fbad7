//! Event Store
//!
//! Core implementation of the Event Store pattern.
//! Provides atomic event persistence with optimistic concurrency control:
//! every append writes the event rows and their outbox rows in one
//! transaction, so an event is durable if and only if it is queued for
//! delivery.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::codec;
use crate::domain::DomainEvent;
use crate::outbox::{self, OutboxMessage};

use super::EventStoreError;

/// Stored event loaded from the database
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub event_type: String,
    pub event_data: Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    /// Re-hydrate the stored payload into a typed event.
    pub fn decode(&self) -> Result<DomainEvent, codec::DecodeError> {
        codec::decode(&self.event_type, &self.event_data)
    }
}

/// Deadline applied to each statement unless overridden.
const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Event Store for persisting and retrieving events
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: PgPool,
    statement_timeout: Duration,
    wake: Option<Arc<Notify>>,
}

impl EventStore {
    /// Create a new EventStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            wake: None,
        }
    }

    /// Create an EventStore that signals the given handle after every
    /// committed append, so the outbox relay drains without waiting out
    /// its poll interval.
    pub fn with_wake(pool: PgPool, wake: Arc<Notify>) -> Self {
        Self {
            wake: Some(wake),
            ..Self::new(pool)
        }
    }

    /// Override the per-statement deadline.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Append events to an aggregate's stream with optimistic concurrency.
    ///
    /// Runs on a single transaction: read the current version, verify it
    /// matches `expected_version`, then insert one `events` row and one
    /// `outbox` row per event. Any failure rolls the whole batch back,
    /// as does cancellation of the in-flight future. Each statement runs
    /// under the store's deadline; an elapsed deadline surfaces as
    /// [`EventStoreError::Timeout`] naming the operation that stalled.
    ///
    /// Returns the new head version. Callers that hit a
    /// [`EventStoreError::ConcurrencyConflict`] are expected to reload the
    /// aggregate, recompute intent, and retry; the store performs no
    /// automatic retry.
    pub async fn append_events(
        &self,
        tenant_id: Uuid,
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
        new_events: &[DomainEvent],
    ) -> Result<i64, EventStoreError> {
        if new_events.is_empty() {
            return Err(EventStoreError::InvalidArgument(
                "new_events must not be empty".to_string(),
            ));
        }
        if expected_version < 0 {
            return Err(EventStoreError::InvalidArgument(format!(
                "expected_version must not be negative (got {expected_version})"
            )));
        }

        let mut tx = self.pool.begin().await.map_err(|err| match err {
            sqlx::Error::PoolTimedOut => EventStoreError::Timeout {
                operation: "pool acquire",
            },
            other => EventStoreError::Database(other),
        })?;

        let current_version = self
            .timed(
                "read current version",
                Self::current_version(&mut tx, tenant_id, aggregate_id),
            )
            .await?;
        if current_version != expected_version {
            // Transaction rolls back on drop
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        let mut version = current_version;
        for event in new_events {
            version += 1;
            let event_data = codec::encode(event)?;

            let inserted = tokio::time::timeout(
                self.statement_timeout,
                sqlx::query(
                    r#"
                    INSERT INTO events (
                        event_id, aggregate_id, aggregate_type,
                        event_type, event_data, version, tenant_id, created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(event.metadata.event_id)
                .bind(aggregate_id)
                .bind(aggregate_type)
                .bind(event.event_type())
                .bind(&event_data)
                .bind(version)
                .bind(tenant_id)
                .bind(event.metadata.timestamp)
                .execute(&mut *tx),
            )
            .await
            .map_err(|_| EventStoreError::Timeout {
                operation: "insert event",
            })?;

            if let Err(err) = inserted {
                return Err(self
                    .classify_insert_error(
                        err,
                        tenant_id,
                        aggregate_id,
                        expected_version,
                        event.metadata.event_id,
                    )
                    .await);
            }

            self.timed(
                "enqueue outbox row",
                outbox::enqueue_tx(
                    &mut tx,
                    &OutboxMessage {
                        event_id: event.metadata.event_id,
                        aggregate_id,
                        aggregate_type: aggregate_type.to_string(),
                        event_type: event.event_type().to_string(),
                        event_data,
                        tenant_id,
                    },
                ),
            )
            .await?;
        }

        self.timed("commit append", tx.commit()).await?;

        tracing::debug!(
            %tenant_id,
            %aggregate_id,
            aggregate_type,
            new_version = version,
            appended = new_events.len(),
            "Events appended"
        );

        if let Some(wake) = &self.wake {
            wake.notify_one();
        }

        Ok(version)
    }

    /// Load all events for an aggregate, ordered strictly by version.
    ///
    /// Fails with [`EventStoreError::AggregateNotFound`] when no events
    /// exist: an aggregate only exists once its creation event has been
    /// appended.
    pub async fn load_events(
        &self,
        tenant_id: Uuid,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        let rows: Vec<(Uuid, String, Value, i64, DateTime<Utc>)> = self
            .timed(
                "load events",
                sqlx::query_as(
                    r#"
                    SELECT event_id, event_type, event_data, version, created_at
                    FROM events
                    WHERE aggregate_id = $1 AND tenant_id = $2
                    ORDER BY version ASC
                    "#,
                )
                .bind(aggregate_id)
                .bind(tenant_id)
                .fetch_all(&self.pool),
            )
            .await?;

        if rows.is_empty() {
            return Err(EventStoreError::AggregateNotFound {
                aggregate_id,
                aggregate_type: aggregate_type.to_string(),
            });
        }

        Ok(rows
            .into_iter()
            .map(
                |(event_id, event_type, event_data, version, created_at)| EventRecord {
                    event_id,
                    event_type,
                    event_data,
                    version,
                    created_at,
                },
            )
            .collect())
    }

    /// Get the current version of an aggregate (0 for a fresh aggregate)
    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        aggregate_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        let result: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(version) FROM events
            WHERE aggregate_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(aggregate_id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await?
        .flatten();

        Ok(result.unwrap_or(0))
    }

    /// Run one statement under the store's deadline.
    ///
    /// An elapsed deadline (or a saturated pool, which sqlx reports as
    /// `PoolTimedOut`) becomes a [`EventStoreError::Timeout`] that names
    /// the operation.
    async fn timed<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, EventStoreError> {
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Err(_) => Err(EventStoreError::Timeout { operation }),
            Ok(Err(sqlx::Error::PoolTimedOut)) => Err(EventStoreError::Timeout {
                operation: "pool acquire",
            }),
            Ok(Err(err)) => Err(EventStoreError::Database(err)),
            Ok(Ok(value)) => Ok(value),
        }
    }

    /// Map an insert failure to its domain meaning.
    ///
    /// A unique violation on the `(tenant_id, aggregate_id, version)`
    /// constraint means another writer won the race between our version
    /// check and insert; the constraint is the correctness anchor below
    /// serializable isolation. A violation of the events primary key means
    /// the same event id was appended twice.
    async fn classify_insert_error(
        &self,
        err: sqlx::Error,
        tenant_id: Uuid,
        aggregate_id: Uuid,
        expected_version: i64,
        event_id: Uuid,
    ) -> EventStoreError {
        let is_unique_violation = matches!(
            &err,
            sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
        );
        if !is_unique_violation {
            return EventStoreError::Database(err);
        }

        let is_event_id_collision = matches!(
            &err,
            sqlx::Error::Database(db) if db.constraint() == Some("events_pkey")
        );
        if is_event_id_collision {
            return EventStoreError::DuplicateEventId(event_id);
        }

        // Version race lost; report the version the winner left behind.
        let actual: Result<Option<i64>, sqlx::Error> = sqlx::query_scalar(
            r#"
            SELECT MAX(version) FROM events
            WHERE aggregate_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(aggregate_id)
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await;

        match actual {
            Ok(actual) => EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: actual.unwrap_or(0),
            },
            Err(read_err) => EventStoreError::Database(read_err),
        }
    }
}
