//! Event Store Errors
//!
//! Error types for event store operations.

use uuid::Uuid;

use crate::codec::EncodeError;

/// Errors that can occur in the event store
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// Aggregate not found
    #[error("{aggregate_type} with ID {aggregate_id} not found")]
    AggregateNotFound {
        aggregate_id: Uuid,
        aggregate_type: String,
    },

    /// Caller bug: empty batch, negative expected version
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An event with this id was already appended
    #[error("Event id already exists: {0}")]
    DuplicateEventId(Uuid),

    /// Payload encoding failure
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The named operation exceeded its deadline
    #[error("Operation timed out: {operation}")]
    Timeout { operation: &'static str },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EventStoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }

    /// Check if the caller may retry after reloading the aggregate
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventStoreError::ConcurrencyConflict { .. }
                | EventStoreError::Timeout { .. }
                | EventStoreError::Database(_)
        )
    }
}
