//! Integration tests for the Outbox Relay
//!
//! Require a migrated database reachable via DATABASE_URL. The bus is an
//! in-memory mock so broker failures can be staged deterministically.

use uuid::Uuid;

use finance_tracker::event_store::EventStore;
use finance_tracker::outbox::{ClaimMode, OutboxRelay, PartitionKey, RelayConfig};

mod common;

use common::MockPublisher;

fn relay_config() -> RelayConfig {
    RelayConfig {
        batch_size: 100,
        max_attempts: 3,
        partition_key: PartitionKey::AggregateId,
        claim_mode: ClaimMode::Single,
    }
}

async fn outbox_count(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_process_batch_publishes_fifo_and_drains() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let publisher = MockPublisher::new();
    let relay = OutboxRelay::with_config(pool.clone(), &publisher, relay_config());

    let tenant_id = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    let events = vec![
        common::account_created(account_id, "Ops", "10000.00"),
        common::money_deposited(account_id, "1.00", "one"),
        common::money_deposited(account_id, "2.00", "two"),
    ];
    store
        .append_events(tenant_id, account_id, "Account", 0, &events)
        .await
        .unwrap();

    let published = relay.process_batch().await.unwrap();
    assert_eq!(published, 3);
    assert_eq!(outbox_count(&pool).await, 0);

    let sent = publisher.sent();
    assert_eq!(sent.len(), 3);
    // Insertion order matches commit order
    for (message, event) in sent.iter().zip(&events) {
        assert_eq!(message.topic, "finance.account.events");
        assert_eq!(message.key, account_id.to_string().into_bytes());
        let payload: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(payload["type"], event.event_type());
        assert_eq!(
            payload["metadata"]["event_id"],
            event.metadata.event_id.to_string()
        );
    }
    // The decimal survives delivery in string form
    let first: serde_json::Value = serde_json::from_slice(&sent[0].payload).unwrap();
    assert_eq!(first["initial_balance"], "10000.00");
}

#[tokio::test]
async fn test_bus_outage_retains_rows_until_recovery() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let publisher = MockPublisher::new();
    let relay = OutboxRelay::with_config(pool.clone(), &publisher, relay_config());

    let tenant_id = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    store
        .append_events(
            tenant_id,
            account_id,
            "Account",
            0,
            &[common::account_created(account_id, "Ops", "5.00")],
        )
        .await
        .unwrap();

    // Broker down: the append already succeeded, nothing is delivered
    publisher.set_fail_all(true);
    let published = relay.process_batch().await.unwrap();
    assert_eq!(published, 0);
    assert_eq!(outbox_count(&pool).await, 1);

    let (attempts, last_error): (i32, Option<String>) =
        sqlx::query_as("SELECT attempts, last_error FROM outbox")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(attempts, 1);
    assert!(last_error.is_some());

    // Broker recovers, but the row is still inside its backoff window
    publisher.set_fail_all(false);
    let published = relay.process_batch().await.unwrap();
    assert_eq!(published, 0);

    // Past the deadline it goes out in insertion order
    sqlx::query("UPDATE outbox SET last_attempt_at = NULL")
        .execute(&pool)
        .await
        .unwrap();

    let published = relay.process_batch().await.unwrap();
    assert_eq!(published, 1);
    assert_eq!(outbox_count(&pool).await, 0);
}

#[tokio::test]
async fn test_failing_row_does_not_block_later_rows() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let publisher = MockPublisher::new();
    let relay = OutboxRelay::with_config(pool.clone(), &publisher, relay_config());

    let tenant_id = Uuid::new_v4();
    let poisoned = Uuid::new_v4();
    let healthy = Uuid::new_v4();

    // Older row will fail, newer row must still go out
    store
        .append_events(
            tenant_id,
            poisoned,
            "Account",
            0,
            &[common::account_created(poisoned, "Poisoned", "1.00")],
        )
        .await
        .unwrap();
    store
        .append_events(
            tenant_id,
            healthy,
            "Account",
            0,
            &[common::account_created(healthy, "Healthy", "2.00")],
        )
        .await
        .unwrap();

    publisher.fail_key(poisoned.to_string().as_bytes());

    let published = relay.process_batch().await.unwrap();
    assert_eq!(published, 1);
    assert_eq!(outbox_count(&pool).await, 1);

    let sent = publisher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].key, healthy.to_string().into_bytes());
}

#[tokio::test]
async fn test_poison_row_dead_lettered_after_max_attempts() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let publisher = MockPublisher::new();
    let relay = OutboxRelay::with_config(pool.clone(), &publisher, relay_config());

    let tenant_id = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    store
        .append_events(
            tenant_id,
            account_id,
            "Account",
            0,
            &[common::account_created(account_id, "Poison", "1.00")],
        )
        .await
        .unwrap();

    publisher.fail_key(account_id.to_string().as_bytes());

    // max_attempts is 3; drive the row to its cap, clearing the backoff
    // deadline between iterations
    for _ in 0..3 {
        let published = relay.process_batch().await.unwrap();
        assert_eq!(published, 0);
        sqlx::query("UPDATE outbox SET last_attempt_at = NULL")
            .execute(&pool)
            .await
            .unwrap();
    }

    assert_eq!(relay.dead_letter_count().await.unwrap(), 1);

    // Dead-lettered: no further attempts even with the broker healthy
    publisher.set_fail_all(false);
    let published = relay.process_batch().await.unwrap();
    assert_eq!(published, 0);
    assert_eq!(outbox_count(&pool).await, 1);
    assert!(publisher.sent().is_empty());
}

#[tokio::test]
async fn test_event_id_partition_key_mode() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let publisher = MockPublisher::new();
    let relay = OutboxRelay::with_config(
        pool.clone(),
        &publisher,
        RelayConfig {
            partition_key: PartitionKey::EventId,
            ..relay_config()
        },
    );

    let tenant_id = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    let event = common::account_created(account_id, "Ops", "1.00");
    let event_id = event.metadata.event_id;

    store
        .append_events(tenant_id, account_id, "Account", 0, &[event])
        .await
        .unwrap();

    relay.process_batch().await.unwrap();

    let sent = publisher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].key, event_id.to_string().into_bytes());
}

#[tokio::test]
async fn test_skip_locked_claim_mode_drains_normally() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let publisher = MockPublisher::new();
    let relay = OutboxRelay::with_config(
        pool.clone(),
        &publisher,
        RelayConfig {
            claim_mode: ClaimMode::SkipLocked,
            ..relay_config()
        },
    );

    let tenant_id = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    store
        .append_events(
            tenant_id,
            account_id,
            "Account",
            0,
            &[common::account_created(account_id, "Ops", "9.99")],
        )
        .await
        .unwrap();

    let published = relay.process_batch().await.unwrap();
    assert_eq!(published, 1);
    assert_eq!(outbox_count(&pool).await, 0);
}

#[tokio::test]
async fn test_empty_outbox_returns_zero() {
    let pool = common::setup_test_db().await;
    let publisher = MockPublisher::new();
    let relay = OutboxRelay::with_config(pool, &publisher, relay_config());

    assert_eq!(relay.process_batch().await.unwrap(), 0);
    assert!(publisher.sent().is_empty());
}
