//! Event service backed by the process-wide event registry.
//!
//! Kept in its own test binary: the global registry can be installed once
//! per process.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use event_outbox::adapters::{InMemoryEventBus, InMemoryStore};
use event_outbox::application::EventService;
use event_outbox::domain::event_log::EventLogEntry;
use event_outbox::domain::foundation::{registry, ErrorCode, Event, EventRegistry, IntegrationEvent};
use event_outbox::ports::EventLogRepository;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ToastServed {
    table: u32,
}

impl IntegrationEvent for ToastServed {
    const KIND: &'static str = "kitchen.ToastServed";
}

#[tokio::test]
async fn service_uses_the_installed_global_registry() {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryEventBus::new());

    let err = EventService::with_global_registry(Arc::clone(&store), store.clone(), bus.clone())
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::InternalError);

    registry::install_global(EventRegistry::new().with::<ToastServed>().unwrap()).unwrap();
    let err = registry::install_global(EventRegistry::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::InternalError);

    let service =
        EventService::with_global_registry(Arc::clone(&store), store.clone(), bus.clone()).unwrap();
    assert!(service.registry().contains(ToastServed::KIND));

    let event = Event::new(&ToastServed { table: 4 })
        .unwrap()
        .with_entity_id("T4");
    store.seed_entry(EventLogEntry::new(&event).unwrap());

    let pending = service.get_pending_events(10).await.unwrap();
    assert_eq!(pending, vec![event.clone()]);

    service.publish(&event).await.unwrap();
    assert_eq!(bus.published_events(), vec![event.clone()]);
    assert!(store.find(event.id()).await.unwrap().is_some());
}
