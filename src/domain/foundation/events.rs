//! Event infrastructure for outbox publishing.
//!
//! This module provides the core types for moving domain facts through the outbox:
//! - `IntegrationEvent` - Trait that all typed events implement
//! - `Event` - Type-erased event carried by the log and the broker
//! - `short_kind_name` - Derives the short kind name from a fully-qualified one

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{DomainError, EntityId, ErrorCode, EventId, Timestamp};

// ============================================
// IntegrationEvent Trait
// ============================================

/// Trait that all typed integration events must implement.
///
/// `KIND` is the fully-qualified kind name (e.g., "orders.OrderCreated").
/// The last dot-separated segment is the short name that broker
/// subscriptions and legacy log rows may use instead.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct OrderCreated { order_id: String, total_cents: i64 }
///
/// impl IntegrationEvent for OrderCreated {
///     const KIND: &'static str = "orders.OrderCreated";
/// }
/// ```
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Fully-qualified kind name used for routing and registry lookup.
    const KIND: &'static str;

    /// Returns the short kind name (last dot-separated segment).
    fn short_kind() -> &'static str {
        short_kind_name(Self::KIND)
    }
}

/// Returns the last dot-separated segment of a kind name.
pub fn short_kind_name(kind: &str) -> &str {
    kind.rsplit('.').next().unwrap_or(kind)
}

// ============================================
// Event
// ============================================

/// Type-erased event: identity, context and a JSON payload tagged with its kind.
///
/// The id and creation time are fixed at construction. The entity id is
/// set at most once, either up front or when the owning business row is
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity_id: Option<EntityId>,
    kind: String,
    payload: JsonValue,
}

impl Event {
    /// Creates an event from a typed integration event.
    ///
    /// # Errors
    ///
    /// Returns `SerializationFailed` if the payload cannot be represented as JSON.
    pub fn new<T: IntegrationEvent>(payload: &T) -> Result<Self, DomainError> {
        let payload = serde_json::to_value(payload).map_err(|e| {
            DomainError::new(
                ErrorCode::SerializationFailed,
                format!("Failed to serialize {}: {}", T::KIND, e),
            )
            .with_detail("kind", T::KIND)
        })?;
        Ok(Self::raw(T::KIND, payload))
    }

    /// Creates an event from a kind name and an already-encoded payload.
    pub fn raw(kind: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            id: EventId::new(),
            created_at: Timestamp::now(),
            correlation_id: None,
            entity_id: None,
            kind: kind.into(),
            payload,
        }
    }

    /// Add correlation ID for request tracing.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the entity the event describes.
    pub fn with_entity_id(mut self, id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Overrides the creation time (used when replaying or in tests).
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    /// Fills the entity id if none was set yet.
    ///
    /// Returns true if the id was assigned by this call.
    pub fn assign_entity_id(&mut self, id: EntityId) -> bool {
        if self.entity_id.is_some() {
            return false;
        }
        self.entity_id = Some(id);
        true
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        self.entity_id.as_ref()
    }

    /// Fully-qualified kind name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Short kind name (last dot-separated segment).
    pub fn short_kind(&self) -> &str {
        short_kind_name(&self.kind)
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    /// Returns true if this event carries the given typed kind.
    pub fn is<T: IntegrationEvent>(&self) -> bool {
        self.kind == T::KIND
    }

    /// Deserialize payload to a specific event type.
    ///
    /// # Errors
    ///
    /// - `UnknownEventKind` if the event is of a different kind
    /// - `DeserializationFailed` if the payload does not match `T`
    pub fn payload_as<T: IntegrationEvent>(&self) -> Result<T, DomainError> {
        if !self.is::<T>() {
            return Err(DomainError::new(
                ErrorCode::UnknownEventKind,
                format!("Event {} is a {}, not a {}", self.id, self.kind, T::KIND),
            )
            .with_detail("kind", self.kind.clone()));
        }
        T::deserialize(&self.payload).map_err(|e| {
            DomainError::new(
                ErrorCode::DeserializationFailed,
                format!("Payload of event {} is not a valid {}: {}", self.id, T::KIND, e),
            )
            .with_detail("event_id", self.id.to_string())
        })
    }

    /// Serializes the whole event to its JSON snapshot form.
    pub fn to_json(&self) -> Result<String, DomainError> {
        serde_json::to_string(self).map_err(|e| {
            DomainError::new(
                ErrorCode::SerializationFailed,
                format!("Failed to serialize event {}: {}", self.id, e),
            )
            .with_detail("event_id", self.id.to_string())
        })
    }

    /// Parses an event from its JSON snapshot form.
    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        serde_json::from_str(json).map_err(|e| {
            DomainError::new(
                ErrorCode::DeserializationFailed,
                format!("Event snapshot is not valid JSON: {}", e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderCreated {
        order_id: String,
        total_cents: i64,
    }

    impl IntegrationEvent for OrderCreated {
        const KIND: &'static str = "orders.OrderCreated";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderShipped {
        order_id: String,
    }

    impl IntegrationEvent for OrderShipped {
        const KIND: &'static str = "orders.OrderShipped";
    }

    fn order_created() -> OrderCreated {
        OrderCreated {
            order_id: "E1".to_string(),
            total_cents: 4200,
        }
    }

    // ============================================================
    // Kind Name Tests
    // ============================================================

    #[test]
    fn short_kind_name_takes_last_segment() {
        assert_eq!(short_kind_name("orders.OrderCreated"), "OrderCreated");
        assert_eq!(short_kind_name("a.b.c.Deep"), "Deep");
        assert_eq!(short_kind_name("Flat"), "Flat");
    }

    #[test]
    fn integration_event_short_kind_uses_kind_constant() {
        assert_eq!(OrderCreated::short_kind(), "OrderCreated");
    }

    // ============================================================
    // Event Construction Tests
    // ============================================================

    #[test]
    fn new_event_serializes_payload_and_kind() {
        let event = Event::new(&order_created()).unwrap();
        assert_eq!(event.kind(), "orders.OrderCreated");
        assert_eq!(event.short_kind(), "OrderCreated");
        assert_eq!(event.payload(), &json!({"order_id": "E1", "total_cents": 4200}));
        assert!(event.entity_id().is_none());
        assert!(event.correlation_id().is_none());
    }

    #[test]
    fn events_get_unique_ids() {
        let a = Event::new(&order_created()).unwrap();
        let b = Event::new(&order_created()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn builders_set_context() {
        let event = Event::raw("orders.OrderCreated", json!({}))
            .with_correlation_id("req-1")
            .with_entity_id("E1");
        assert_eq!(event.correlation_id(), Some("req-1"));
        assert_eq!(event.entity_id(), Some(&EntityId::new("E1")));
    }

    #[test]
    fn assign_entity_id_only_fills_empty_slot() {
        let mut event = Event::new(&order_created()).unwrap();
        assert!(event.assign_entity_id(EntityId::new("E1")));
        assert!(!event.assign_entity_id(EntityId::new("E2")));
        assert_eq!(event.entity_id(), Some(&EntityId::new("E1")));
    }

    // ============================================================
    // Payload Tests
    // ============================================================

    #[test]
    fn payload_as_returns_typed_event() {
        let event = Event::new(&order_created()).unwrap();
        let typed: OrderCreated = event.payload_as().unwrap();
        assert_eq!(typed, order_created());
    }

    #[test]
    fn payload_as_rejects_other_kind() {
        let event = Event::new(&order_created()).unwrap();
        let err = event.payload_as::<OrderShipped>().unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownEventKind);
    }

    #[test]
    fn payload_as_rejects_malformed_payload() {
        let event = Event::raw(OrderCreated::KIND, json!({"order_id": 7}));
        let err = event.payload_as::<OrderCreated>().unwrap_err();
        assert_eq!(err.code, ErrorCode::DeserializationFailed);
    }

    // ============================================================
    // Snapshot Tests
    // ============================================================

    #[test]
    fn json_snapshot_restores_equal_event() {
        let event = Event::new(&order_created())
            .unwrap()
            .with_correlation_id("req-9")
            .with_entity_id("E1");
        let json = event.to_json().unwrap();
        let restored = Event::from_json(&json).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn snapshot_omits_empty_optionals() {
        let event = Event::raw("orders.OrderCreated", json!({}));
        let json = event.to_json().unwrap();
        assert!(!json.contains("correlation_id"));
        assert!(!json.contains("entity_id"));
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = Event::from_json("{not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::DeserializationFailed);
    }
}
