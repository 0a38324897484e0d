//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the outbox core to external systems:
//! - `events` - Event bus implementations and the publisher loop
//! - `memory` - In-memory store for tests and demos
//! - `postgres` - PostgreSQL event log and failed message store
//! - `redis` - Redis pub/sub broker publisher

pub mod events;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use events::{InMemoryEventBus, OutboxPublisher, OutboxPublisherConfig};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use self::redis::RedisEventPublisher;
