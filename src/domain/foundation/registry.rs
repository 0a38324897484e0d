//! Event kind registry.
//!
//! Maps kind names to the typed events that own them so log entries can be
//! resolved and validated without reflection. Kinds are registered up front;
//! lookups accept the fully-qualified name first and fall back to the short
//! name when it is unambiguous.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = EventRegistry::new();
//! registry.register::<OrderCreated>()?;
//! registry.register::<OrderShipped>()?;
//!
//! let event = registry.decode("OrderCreated", &entry_content)?;
//! ```

use once_cell::sync::OnceCell;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use super::events::short_kind_name;
use super::{DomainError, ErrorCode, Event, IntegrationEvent};

type PayloadCheck = fn(&JsonValue) -> Result<(), serde_json::Error>;

fn check_payload<T: IntegrationEvent>(payload: &JsonValue) -> Result<(), serde_json::Error> {
    T::deserialize(payload).map(|_| ())
}

#[derive(Clone, Copy)]
struct RegisteredKind {
    kind: &'static str,
    check: PayloadCheck,
}

/// Registry of known event kinds.
#[derive(Clone, Default)]
pub struct EventRegistry {
    kinds: HashMap<&'static str, RegisteredKind>,
    /// Short name to full name; `None` when two kinds share a short name.
    short_names: HashMap<&'static str, Option<&'static str>>,
}

impl EventRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed event under its kind name.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` if the kind is already registered.
    pub fn register<T: IntegrationEvent>(&mut self) -> Result<(), DomainError> {
        if self.kinds.contains_key(T::KIND) {
            return Err(DomainError::validation(
                "kind",
                format!("Event kind '{}' is already registered", T::KIND),
            ));
        }
        self.kinds.insert(
            T::KIND,
            RegisteredKind {
                kind: T::KIND,
                check: check_payload::<T>,
            },
        );
        self.short_names
            .entry(short_kind_name(T::KIND))
            .and_modify(|slot| *slot = None)
            .or_insert(Some(T::KIND));
        Ok(())
    }

    /// Builder form of `register`.
    pub fn with<T: IntegrationEvent>(mut self) -> Result<Self, DomainError> {
        self.register::<T>()?;
        Ok(self)
    }

    /// Resolves a full or short kind name to the registered full name.
    pub fn resolve(&self, kind: &str) -> Option<&'static str> {
        if let Some(registered) = self.kinds.get(kind) {
            return Some(registered.kind);
        }
        self.short_names.get(kind).copied().flatten()
    }

    /// Returns true if the kind (full or unambiguous short name) is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.resolve(kind).is_some()
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Fails with `UnknownEventKind` on the first kind that does not resolve.
    pub fn ensure_registered(&self, kinds: &[&str]) -> Result<(), DomainError> {
        match kinds.iter().find(|kind| !self.contains(kind)) {
            Some(kind) => Err(DomainError::unknown_kind(*kind)),
            None => Ok(()),
        }
    }

    /// Checks that the event's kind is registered and its payload has the registered shape.
    pub fn validate(&self, event: &Event) -> Result<(), DomainError> {
        let registered = self.lookup(event.kind())?;
        (registered.check)(event.payload()).map_err(|e| {
            DomainError::new(
                ErrorCode::DeserializationFailed,
                format!(
                    "Payload of event {} does not match {}: {}",
                    event.id(),
                    registered.kind,
                    e
                ),
            )
            .with_detail("event_id", event.id().to_string())
            .with_detail("kind", registered.kind)
        })
    }

    /// Restores an event from its JSON snapshot, resolving `kind` through the registry.
    ///
    /// # Errors
    ///
    /// - `UnknownEventKind` if `kind` does not resolve
    /// - `DeserializationFailed` if the snapshot is malformed or the payload
    ///   does not match the registered type
    pub fn decode(&self, kind: &str, content: &str) -> Result<Event, DomainError> {
        let registered = self.lookup(kind)?;
        let event = Event::from_json(content)?;
        if self.resolve(event.kind()) != Some(registered.kind) {
            return Err(DomainError::new(
                ErrorCode::DeserializationFailed,
                format!(
                    "Snapshot of event {} carries kind '{}', expected '{}'",
                    event.id(),
                    event.kind(),
                    registered.kind
                ),
            )
            .with_detail("event_id", event.id().to_string()));
        }
        self.validate(&event)?;
        Ok(event)
    }

    fn lookup(&self, kind: &str) -> Result<RegisteredKind, DomainError> {
        self.resolve(kind)
            .and_then(|full| self.kinds.get(full).copied())
            .ok_or_else(|| DomainError::unknown_kind(kind))
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.kinds.keys().collect();
        kinds.sort();
        f.debug_struct("EventRegistry").field("kinds", &kinds).finish()
    }
}

static GLOBAL_REGISTRY: OnceCell<Arc<EventRegistry>> = OnceCell::new();

/// Installs the process-wide registry.
///
/// # Errors
///
/// Returns `InternalError` if a global registry was already installed.
pub fn install_global(registry: EventRegistry) -> Result<Arc<EventRegistry>, DomainError> {
    let registry = Arc::new(registry);
    GLOBAL_REGISTRY.set(Arc::clone(&registry)).map_err(|_| {
        DomainError::new(
            ErrorCode::InternalError,
            "Global event registry is already installed",
        )
    })?;
    Ok(registry)
}

/// Returns the process-wide registry, if one was installed.
pub fn global() -> Option<Arc<EventRegistry>> {
    GLOBAL_REGISTRY.get().cloned()
}
