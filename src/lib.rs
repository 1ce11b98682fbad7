//! financeTracker Library
//!
//! Event-sourced write path for a multi-tenant finance tracking platform:
//! append-only event store with optimistic concurrency, and a transactional
//! outbox relay delivering committed events to the streaming bus.

pub mod bus;
pub mod codec;
pub mod config;
pub mod db;
pub mod domain;
pub mod event_store;
pub mod outbox;

pub use bus::{EventPublisher, KafkaEventPublisher, PublishError};
pub use config::Config;
pub use domain::{AccountEvent, AccountKind, Currency, DomainEvent, EventMetadata};
pub use event_store::{EventRecord, EventStore, EventStoreError};
pub use outbox::{OutboxRelay, RelayConfig, RelayScheduler};
