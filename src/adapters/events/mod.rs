//! Event bus adapters.
//!
//! Adapters implement the event publishing and subscribing ports
//! for different environments:
//!
//! - `InMemoryEventBus` - Synchronous, in-process bus for testing
//! - `SerializedPublisher` - Wrapper that serializes concurrent publishes
//! - `VariantHandler` - Typed dispatch over a closed set of event kinds
//! - `OutboxPublisher` - Background service for reliable event delivery

mod in_memory;
mod outbox_publisher;
mod serialized_publisher;
mod variant_handler;

pub use in_memory::InMemoryEventBus;
pub use outbox_publisher::{CycleReport, OutboxPublisher, OutboxPublisherConfig, PublisherState};
pub use serialized_publisher::SerializedPublisher;
pub use variant_handler::{subscribe_variant, EventVariant, TypedEventHandler, VariantHandler};
