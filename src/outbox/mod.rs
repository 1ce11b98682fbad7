//! Transactional Outbox
//!
//! Write side: co-transactional enqueue invoked by the event store.
//! Read side: the relay that drains committed rows into the bus.

mod relay;
mod writer;

pub use relay::{
    topic_for, ClaimMode, OutboxRelay, PartitionKey, RelayConfig, RelayError, RelayScheduler,
};
pub use writer::{enqueue_tx, OutboxMessage};
