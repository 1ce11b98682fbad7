//! Event Codec
//!
//! Canonical JSON encoding of domain events for the event table and the
//! outbox. Identifiers encode as lowercase hyphenated strings, decimals as
//! decimal strings (never floats), timestamps as RFC 3339 UTC, enums by
//! their wire value. Encoding is deterministic: the same event always
//! produces the same payload.

use serde_json::Value;

use crate::domain::DomainEvent;

/// Payload could not be produced. Indicates a schema or code bug, never
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to encode {event_type} payload: {source}")]
    Serialization {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Stored payload could not be turned back into a typed event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to decode {event_type} payload: {source}")]
    Serialization {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload tag {found:?} does not match stored event type {expected:?}")]
    TypeMismatch { expected: String, found: String },
}

/// Encode an event into its canonical payload.
///
/// No partial payloads: any unrepresentable field fails the whole encode.
pub fn encode(event: &DomainEvent) -> Result<Value, EncodeError> {
    serde_json::to_value(event).map_err(|source| EncodeError::Serialization {
        event_type: event.event_type(),
        source,
    })
}

/// Re-hydrate a stored payload into a typed event.
///
/// The stored `event_type` column must agree with the tag embedded in the
/// payload; a mismatch means the row was corrupted or written by foreign
/// code.
pub fn decode(event_type: &str, data: &Value) -> Result<DomainEvent, DecodeError> {
    let found = data
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if found != event_type {
        return Err(DecodeError::TypeMismatch {
            expected: event_type.to_string(),
            found: found.to_string(),
        });
    }

    serde_json::from_value(data.clone()).map_err(|source| DecodeError::Serialization {
        event_type: event_type.to_string(),
        source,
    })
}
