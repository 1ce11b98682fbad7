//! Kafka publisher
//!
//! `EventPublisher` implementation over an rdkafka `FutureProducer`.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;

use crate::config::Config;

use super::{EventPublisher, PublishError};

/// Kafka-backed publisher with durable-delivery producer settings.
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl KafkaEventPublisher {
    /// Build a producer from application configuration.
    ///
    /// With `acks=all` the producer also enables idempotence, so rdkafka's
    /// internal retries cannot reorder or duplicate in-flight messages.
    pub fn from_config(config: &Config) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_bootstrap_servers)
            .set("acks", &config.kafka_acks)
            .set(
                "message.timeout.ms",
                config.kafka_publish_timeout.as_millis().to_string(),
            );
        if config.kafka_acks == "all" {
            client_config.set("enable.idempotence", "true");
        }

        let producer = client_config.create()?;
        Ok(Self {
            producer,
            delivery_timeout: config.kafka_publish_timeout,
        })
    }

    /// Wrap an existing producer.
    pub fn new(producer: FutureProducer, delivery_timeout: Duration) -> Self {
        Self {
            producer,
            delivery_timeout,
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), PublishError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        self.producer
            .send(record, self.delivery_timeout)
            .await
            .map(|_| ())
            .map_err(|(err, _)| match err {
                KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut) => {
                    PublishError::Timeout(self.delivery_timeout)
                }
                other => PublishError::Kafka(other),
            })
    }
}
