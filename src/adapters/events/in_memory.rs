//! In-memory event bus implementation for testing.
//!
//! Provides synchronous, deterministic event delivery for unit tests.
//!
//! # Security Note
//!
//! This adapter is for **testing only** and should not be used in production.
//! It uses `.expect()` on lock operations which will panic if locks are poisoned.
//! Production code should use the Redis publisher adapter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::domain::foundation::{DomainError, EntityId, ErrorCode, Event};
use crate::ports::{EventHandler, EventPublisher, EventSubscriber};

/// In-memory event bus for testing.
///
/// Features:
/// - Synchronous delivery (deterministic for tests)
/// - Event capture for assertions
/// - Handler registration by full or short kind name
/// - Simulated broker outage via `set_connected(false)`
///
/// Handler failures are logged and never fail the publish.
///
/// # Panics
///
/// Methods may panic if internal locks are poisoned. This is acceptable
/// for test code but this adapter should NOT be used in production.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
///
/// // Publish events
/// bus.publish(&event).await?;
///
/// // Assert in tests
/// assert_eq!(bus.event_count(), 1);
/// assert!(bus.has_event("orders.OrderCreated"));
/// ```
pub struct InMemoryEventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    published: RwLock<Vec<Event>>,
    connected: AtomicBool,
}

impl InMemoryEventBus {
    /// Creates a new empty, connected event bus.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            published: RwLock::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Simulates the broker going away or coming back.
    ///
    /// While disconnected, `publish` fails with `BrokerUnavailable`.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    // === Test Helpers ===

    /// Returns all published events (for test assertions).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn published_events(&self) -> Vec<Event> {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .clone()
    }

    /// Returns events of a specific kind.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn events_of_kind(&self, kind: &str) -> Vec<Event> {
        self.published_events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    /// Returns events for a specific entity.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn events_for_entity(&self, entity_id: &EntityId) -> Vec<Event> {
        self.published_events()
            .into_iter()
            .filter(|e| e.entity_id() == Some(entity_id))
            .collect()
    }

    /// Clears all published events (for test isolation).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        self.published
            .write()
            .expect("InMemoryEventBus: published write lock poisoned")
            .clear();
    }

    /// Returns count of published events.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .len()
    }

    /// Checks if a specific kind was published.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn has_event(&self, kind: &str) -> bool {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .iter()
            .any(|e| e.kind() == kind)
    }

    fn handlers_for(&self, event: &Event) -> Vec<Arc<dyn EventHandler>> {
        let handlers = self
            .handlers
            .read()
            .expect("InMemoryEventBus: handlers lock poisoned");

        let mut matched = handlers.get(event.kind()).cloned().unwrap_or_default();
        if event.short_kind() != event.kind() {
            if let Some(short) = handlers.get(event.short_kind()) {
                matched.extend(short.iter().cloned());
            }
        }
        matched
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: &Event) -> Result<(), DomainError> {
        if !self.is_connected() {
            return Err(DomainError::new(
                ErrorCode::BrokerUnavailable,
                "In-memory broker is disconnected",
            )
            .with_detail("event_id", event.id().to_string()));
        }

        // Store for test assertions
        self.published
            .write()
            .expect("InMemoryEventBus: published write lock poisoned")
            .push(event.clone());

        // Handlers are cloned out so no lock is held across await points
        for handler in self.handlers_for(event) {
            if let Err(e) = handler.handle(event.clone()).await {
                warn!(
                    handler = handler.name(),
                    event_id = %event.id(),
                    kind = event.kind(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe(&self, kind: &str, handler: Arc<dyn EventHandler>) {
        let mut handlers = self
            .handlers
            .write()
            .expect("InMemoryEventBus: handlers write lock poisoned");
        handlers.entry(kind.to_string()).or_default().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn test_event(kind: &str, entity: &str) -> Event {
        Event::raw(kind, json!({})).with_entity_id(entity)
    }

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _: Event) -> Result<(), DomainError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &'static str {
            "CountingHandler"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _: Event) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::HandlerFailed, "Handler failed"))
        }
        fn name(&self) -> &'static str {
            "FailingHandler"
        }
    }

    #[tokio::test]
    async fn publish_stores_event() {
        let bus = InMemoryEventBus::new();

        bus.publish(&test_event("orders.OrderCreated", "E1")).await.unwrap();

        assert_eq!(bus.event_count(), 1);
        assert!(bus.has_event("orders.OrderCreated"));
    }

    #[tokio::test]
    async fn filters_by_kind_and_entity() {
        let bus = InMemoryEventBus::new();

        bus.publish(&test_event("type.a", "1")).await.unwrap();
        bus.publish(&test_event("type.b", "2")).await.unwrap();
        bus.publish(&test_event("type.a", "1")).await.unwrap();

        assert_eq!(bus.events_of_kind("type.a").len(), 2);
        assert_eq!(bus.events_for_entity(&EntityId::new("2")).len(), 1);
    }

    #[tokio::test]
    async fn handlers_match_full_and_short_kind() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe("orders.OrderCreated", Arc::new(CountingHandler(counter.clone())));
        bus.subscribe("OrderCreated", Arc::new(CountingHandler(counter.clone())));
        bus.subscribe("orders.OrderShipped", Arc::new(CountingHandler(counter.clone())));

        bus.publish(&test_event("orders.OrderCreated", "1")).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn subscribe_all_registers_for_multiple_kinds() {
        let bus = InMemoryEventBus::new();
        let received = Arc::new(AtomicUsize::new(0));

        bus.subscribe_all(
            &["type.a", "type.b", "type.c"],
            Arc::new(CountingHandler(received.clone())),
        );

        bus.publish(&test_event("type.a", "1")).await.unwrap();
        bus.publish(&test_event("type.b", "2")).await.unwrap();
        bus.publish(&test_event("type.d", "3")).await.unwrap(); // Not subscribed

        assert_eq!(received.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_error_does_not_fail_publish_or_other_handlers() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe("test.event", Arc::new(FailingHandler));
        bus.subscribe("test.event", Arc::new(CountingHandler(counter.clone())));

        bus.publish(&test_event("test.event", "1")).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(bus.event_count(), 1);
    }

    #[tokio::test]
    async fn disconnected_bus_rejects_publish() {
        let bus = InMemoryEventBus::new();
        bus.set_connected(false);

        let err = bus.publish(&test_event("test.event", "1")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BrokerUnavailable);
        assert!(!bus.is_connected());
        assert_eq!(bus.event_count(), 0);

        bus.set_connected(true);
        bus.publish(&test_event("test.event", "1")).await.unwrap();
        assert_eq!(bus.event_count(), 1);
    }

    #[tokio::test]
    async fn clear_removes_all_events() {
        let bus = InMemoryEventBus::new();

        bus.publish(&test_event("test.event", "1")).await.unwrap();
        bus.publish(&test_event("test.event", "2")).await.unwrap();
        assert_eq!(bus.event_count(), 2);

        bus.clear();

        assert_eq!(bus.event_count(), 0);
    }
}
