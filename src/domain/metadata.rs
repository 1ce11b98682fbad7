//! Event Metadata
//!
//! Metadata carried inside every event payload: identity, causal chain,
//! and the producer-asserted timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current payload schema version.
const SCHEMA_VERSION: u32 = 1;

/// Metadata nested inside every stored event payload.
///
/// `event_id` is a UUIDv7, so ids sort by creation time and double as the
/// downstream idempotency key. `correlation_id` is stable across a causal
/// chain of events; `causation_id` points at the immediately upstream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Globally unique, time-ordered event identifier
    pub event_id: Uuid,

    /// Stable across a causal chain of events
    pub correlation_id: Uuid,

    /// Event id of the immediately upstream event, if any
    #[serde(default)]
    pub causation_id: Option<Uuid>,

    /// User on whose behalf the event was produced, if known
    #[serde(default)]
    pub user_id: Option<Uuid>,

    /// Producer-asserted timestamp (becomes the stored `created_at`)
    pub timestamp: DateTime<Utc>,

    /// Payload schema version
    pub schema_version: u32,
}

impl EventMetadata {
    /// Create metadata for a new event with a fresh correlation chain.
    pub fn new() -> Self {
        Self {
            event_id: Uuid::now_v7(),
            correlation_id: Uuid::new_v4(),
            causation_id: None,
            user_id: None,
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Continue an existing correlation chain.
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Record the event that caused this one.
    pub fn with_causation_id(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Attribute the event to a user.
    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Derive metadata for an event caused by this one: same correlation
    /// chain, causation pointing back at this event.
    pub fn caused_event(&self) -> Self {
        Self::new()
            .with_correlation_id(self.correlation_id)
            .with_causation_id(self.event_id)
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}
