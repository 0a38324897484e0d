//! EventSubscriber port - Interface for subscribing to delivered events.
//!
//! This port defines how consumers register interest in event kinds
//! without knowing about the underlying transport mechanism.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, Event};

/// Handler for processing delivered events.
///
/// Implementations should be:
/// - **Idempotent** - delivery is at-least-once, duplicates happen
/// - **Quick** - Long operations should be queued for async processing
/// - **Isolated** - Errors don't affect other handlers or the publisher
///
/// # Example
///
/// ```ignore
/// struct ShippingScheduler { /* ... */ }
///
/// #[async_trait]
/// impl EventHandler for ShippingScheduler {
///     async fn handle(&self, event: Event) -> Result<(), DomainError> {
///         let order: OrderCreated = event.payload_as()?;
///         // Schedule shipment...
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "ShippingScheduler"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process an event.
    async fn handle(&self, event: Event) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// Port for subscribing to events.
///
/// Handlers register interest in specific kinds and are invoked
/// when matching events are published.
///
/// # Example
///
/// ```ignore
/// subscriber.subscribe("orders.OrderCreated", scheduler);
/// subscriber.subscribe_all(&["orders.OrderCreated", "orders.OrderCancelled"], auditor);
/// ```
pub trait EventSubscriber: Send + Sync {
    /// Subscribe handler to a specific event kind.
    fn subscribe(&self, kind: &str, handler: Arc<dyn EventHandler>);

    /// Subscribe handler to multiple event kinds.
    ///
    /// The same handler instance is invoked for any matching kind.
    fn subscribe_all(&self, kinds: &[&str], handler: Arc<dyn EventHandler>) {
        for kind in kinds {
            self.subscribe(kind, Arc::clone(&handler));
        }
    }
}

/// Combined trait for event bus implementations.
///
/// An EventBus provides both publishing and subscribing capabilities.
pub trait EventBus: super::EventPublisher + EventSubscriber {}

// Blanket implementation - any type that implements both traits is an EventBus
impl<T: super::EventPublisher + EventSubscriber> EventBus for T {}
