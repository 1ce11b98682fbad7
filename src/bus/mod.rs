//! Bus Adapter
//!
//! Thin contract over the streaming bus: send one message and wait for the
//! broker's acknowledgment.

use std::time::Duration;

use async_trait::async_trait;

mod kafka;

pub use kafka::KafkaEventPublisher;

/// Errors from a publish attempt. The outbox row stays in place and the
/// relay retries on a later iteration.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Broker unreachable or message rejected
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Delivery was not acknowledged within the configured deadline
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),
}

/// Send-and-await-ack surface over the streaming bus.
///
/// Delivery is confirmed when `publish` returns `Ok`. Implementations may
/// retry internally, but bounded; reattempts across iterations belong to
/// the relay.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), PublishError>;
}
