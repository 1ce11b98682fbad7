//! Common test utilities

use std::sync::Mutex;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use finance_tracker::bus::{EventPublisher, PublishError};
use finance_tracker::domain::{AccountEvent, AccountKind, Currency, DomainEvent};

/// Setup test database - truncate event and outbox tables for a fresh state
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query("TRUNCATE TABLE events, outbox")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    pool
}

/// An account creation event with the given name and balance string
pub fn account_created(account_id: Uuid, name: &str, balance: &str) -> DomainEvent {
    DomainEvent::new(AccountEvent::AccountCreated {
        account_id,
        account_name: name.to_string(),
        currency: Currency::NOK,
        account_type: AccountKind::Savings,
        initial_balance: balance.parse().unwrap(),
    })
}

/// A deposit event for an existing account
pub fn money_deposited(account_id: Uuid, amount: &str, description: &str) -> DomainEvent {
    DomainEvent::new(AccountEvent::MoneyDeposited {
        account_id,
        amount: amount.parse().unwrap(),
        category: None,
        description: description.to_string(),
    })
}

/// One message captured by the mock publisher
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

/// In-memory publisher standing in for the bus.
///
/// Records every acknowledged message; can be told to fail everything
/// (broker outage) or only specific partition keys (poison rows).
#[derive(Debug, Default)]
pub struct MockPublisher {
    sent: Mutex<Vec<SentMessage>>,
    fail_all: Mutex<bool>,
    fail_keys: Mutex<Vec<Vec<u8>>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }

    /// Fail every publish whose partition key matches `key`
    pub fn fail_key(&self, key: &[u8]) {
        self.fail_keys.lock().unwrap().push(key.to_vec());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for &MockPublisher {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), PublishError> {
        let fail_all = *self.fail_all.lock().unwrap();
        let fail_this = self.fail_keys.lock().unwrap().iter().any(|k| k == key);
        if fail_all || fail_this {
            return Err(PublishError::Kafka(KafkaError::MessageProduction(
                RDKafkaErrorCode::BrokerTransportFailure,
            )));
        }

        self.sent.lock().unwrap().push(SentMessage {
            topic: topic.to_string(),
            key: key.to_vec(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
