//! Typed dispatch - Decode delivered events into a closed set of variants.
//!
//! A consumer interested in several kinds defines one enum with a variant per
//! kind and implements `EventVariant` for it. `VariantHandler` decodes each
//! delivered event into that enum and hands it to a `TypedEventHandler`,
//! which matches on it exhaustively.
//!
//! ```ignore
//! enum OrderEvent {
//!     Created(OrderCreated),
//!     Cancelled(OrderCancelled),
//! }
//!
//! impl EventVariant for OrderEvent {
//!     const KINDS: &'static [&'static str] = &[OrderCreated::KIND, OrderCancelled::KIND];
//!
//!     fn decode(event: &Event) -> Result<Self, DomainError> {
//!         if event.is::<OrderCreated>() {
//!             return event.payload_as().map(OrderEvent::Created);
//!         }
//!         if event.is::<OrderCancelled>() {
//!             return event.payload_as().map(OrderEvent::Cancelled);
//!         }
//!         Err(DomainError::unknown_kind(event.kind()))
//!     }
//! }
//!
//! subscribe_variant(&bus, &registry, Arc::new(OrderProjection::new()))?;
//! ```

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, Event, EventRegistry};
use crate::ports::{EventHandler, EventSubscriber};

/// Closed tagged union over the kinds one handler consumes.
pub trait EventVariant: Sized + Send + Sync + 'static {
    /// Fully-qualified kinds this union covers.
    const KINDS: &'static [&'static str];

    /// Decode a delivered event into its variant.
    ///
    /// # Errors
    ///
    /// - `UnknownEventKind` for a kind outside `KINDS`
    /// - `DeserializationFailed` if the payload does not match the variant
    fn decode(event: &Event) -> Result<Self, DomainError>;
}

/// Handler that receives already-decoded variants.
#[async_trait]
pub trait TypedEventHandler<V: EventVariant>: Send + Sync {
    /// Process one variant; `event` carries its metadata.
    async fn handle(&self, variant: V, event: &Event) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// Adapts a `TypedEventHandler` to the untyped `EventHandler` port.
pub struct VariantHandler<V: EventVariant> {
    inner: Arc<dyn TypedEventHandler<V>>,
    _variant: PhantomData<fn() -> V>,
}

impl<V: EventVariant> VariantHandler<V> {
    pub fn new(inner: Arc<dyn TypedEventHandler<V>>) -> Self {
        Self {
            inner,
            _variant: PhantomData,
        }
    }
}

#[async_trait]
impl<V: EventVariant> EventHandler for VariantHandler<V> {
    async fn handle(&self, event: Event) -> Result<(), DomainError> {
        let variant = V::decode(&event)?;
        self.inner.handle(variant, &event).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Subscribe `handler` to every kind of `V`.
///
/// # Errors
///
/// - `UnknownEventKind` if any kind of `V` is missing from `registry`;
///   nothing is subscribed then
pub fn subscribe_variant<V: EventVariant>(
    subscriber: &dyn EventSubscriber,
    registry: &EventRegistry,
    handler: Arc<dyn TypedEventHandler<V>>,
) -> Result<(), DomainError> {
    registry.ensure_registered(V::KINDS)?;
    subscriber.subscribe_all(V::KINDS, Arc::new(VariantHandler::new(handler)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::domain::foundation::{ErrorCode, IntegrationEvent};
    use crate::ports::EventPublisher;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderCreated {
        total_cents: i64,
    }

    impl IntegrationEvent for OrderCreated {
        const KIND: &'static str = "orders.OrderCreated";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderCancelled {
        reason: String,
    }

    impl IntegrationEvent for OrderCancelled {
        const KIND: &'static str = "orders.OrderCancelled";
    }

    #[derive(Debug, Clone, PartialEq)]
    enum OrderEvent {
        Created(OrderCreated),
        Cancelled(OrderCancelled),
    }

    impl EventVariant for OrderEvent {
        const KINDS: &'static [&'static str] = &[OrderCreated::KIND, OrderCancelled::KIND];

        fn decode(event: &Event) -> Result<Self, DomainError> {
            if event.is::<OrderCreated>() {
                return event.payload_as().map(OrderEvent::Created);
            }
            if event.is::<OrderCancelled>() {
                return event.payload_as().map(OrderEvent::Cancelled);
            }
            Err(DomainError::unknown_kind(event.kind()))
        }
    }

    #[derive(Default)]
    struct OrderLedger {
        seen: Mutex<Vec<OrderEvent>>,
    }

    #[async_trait]
    impl TypedEventHandler<OrderEvent> for OrderLedger {
        async fn handle(&self, variant: OrderEvent, _event: &Event) -> Result<(), DomainError> {
            self.seen.lock().unwrap().push(variant);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "OrderLedger"
        }
    }

    fn registry() -> EventRegistry {
        EventRegistry::new()
            .with::<OrderCreated>()
            .unwrap()
            .with::<OrderCancelled>()
            .unwrap()
    }

    #[tokio::test]
    async fn dispatches_decoded_variants() {
        let bus = InMemoryEventBus::new();
        let ledger = Arc::new(OrderLedger::default());
        subscribe_variant::<OrderEvent>(&bus, &registry(), ledger.clone()).unwrap();

        bus.publish(&Event::new(&OrderCreated { total_cents: 700 }).unwrap())
            .await
            .unwrap();
        bus.publish(&Event::new(&OrderCancelled { reason: "stock".into() }).unwrap())
            .await
            .unwrap();

        let seen = ledger.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                OrderEvent::Created(OrderCreated { total_cents: 700 }),
                OrderEvent::Cancelled(OrderCancelled {
                    reason: "stock".into()
                }),
            ]
        );
    }

    #[tokio::test]
    async fn malformed_payload_fails_the_handler_not_the_publish() {
        let bus = InMemoryEventBus::new();
        let ledger = Arc::new(OrderLedger::default());
        subscribe_variant::<OrderEvent>(&bus, &registry(), ledger.clone()).unwrap();

        bus.publish(&Event::raw(OrderCreated::KIND, json!({"total_cents": "lots"})))
            .await
            .unwrap();

        assert!(ledger.seen.lock().unwrap().is_empty());
        assert_eq!(bus.event_count(), 1);
    }

    #[test]
    fn subscribing_with_unregistered_kind_fails() {
        let bus = InMemoryEventBus::new();
        let partial = EventRegistry::new().with::<OrderCreated>().unwrap();

        let err = subscribe_variant::<OrderEvent>(&bus, &partial, Arc::new(OrderLedger::default()))
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::UnknownEventKind);
    }

    #[tokio::test]
    async fn handler_rejects_foreign_kind() {
        let handler = VariantHandler::<OrderEvent>::new(Arc::new(OrderLedger::default()));
        let err = handler
            .handle(Event::raw("billing.InvoicePaid", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownEventKind);
        assert_eq!(handler.name(), "OrderLedger");
    }
}
