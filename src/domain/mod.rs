//! Domain layer - outbox entities and shared primitives.

pub mod event_log;
pub mod failed_messages;
pub mod foundation;
