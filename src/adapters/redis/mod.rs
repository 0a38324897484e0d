//! Redis adapters.
//!
//! - `RedisEventPublisher` - Publishes events on Redis pub/sub channels

mod event_publisher;

pub use event_publisher::RedisEventPublisher;
