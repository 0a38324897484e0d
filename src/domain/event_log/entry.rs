//! Event log entry entity.
//!
//! One entry per event, written in the same transaction as the business
//! change that produced it. The serialized snapshot never changes after
//! creation; only delivery bookkeeping does.

use crate::domain::foundation::{
    short_kind_name, DomainError, EntityId, Event, EventId, EventRegistry, StateMachine,
    Timestamp,
};
use serde::{Deserialize, Serialize};

use super::EventState;

/// Persistent record of an event and its delivery progress.
///
/// # Invariants
///
/// - `content` is the JSON snapshot taken at save time and is never rewritten
/// - `state` only moves along `EventState` transitions
/// - `times_sent` counts entries into `InProgress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    event_id: EventId,

    /// Fully-qualified kind name of the event.
    event_type_name: String,

    /// Entity the event describes, copied from the event for failure grouping.
    entity_id: Option<EntityId>,

    /// JSON snapshot of the whole event.
    content: String,

    state: EventState,
    times_sent: u32,
    creation_time: Timestamp,

    /// When the entry last entered `InProgress`.
    last_attempt_time: Option<Timestamp>,
}

impl EventLogEntry {
    /// Creates a `NotPublished` entry with a snapshot of the event.
    ///
    /// # Errors
    ///
    /// - `SerializationFailed` if the event cannot be serialized
    pub fn new(event: &Event) -> Result<Self, DomainError> {
        Ok(Self {
            event_id: event.id(),
            event_type_name: event.kind().to_string(),
            entity_id: event.entity_id().cloned(),
            content: event.to_json()?,
            state: EventState::NotPublished,
            times_sent: 0,
            creation_time: event.created_at(),
            last_attempt_time: None,
        })
    }

    /// Reconstitute an entry from persistence (no validation).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        event_id: EventId,
        event_type_name: String,
        entity_id: Option<EntityId>,
        content: String,
        state: EventState,
        times_sent: u32,
        creation_time: Timestamp,
        last_attempt_time: Option<Timestamp>,
    ) -> Self {
        Self {
            event_id,
            event_type_name,
            entity_id,
            content,
            state,
            times_sent,
            creation_time,
            last_attempt_time,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn event_type_name(&self) -> &str {
        &self.event_type_name
    }

    /// Returns the last dot-separated segment of the kind name.
    pub fn event_type_short_name(&self) -> &str {
        short_kind_name(&self.event_type_name)
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        self.entity_id.as_ref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    pub fn times_sent(&self) -> u32 {
        self.times_sent
    }

    pub fn creation_time(&self) -> Timestamp {
        self.creation_time
    }

    pub fn last_attempt_time(&self) -> Option<Timestamp> {
        self.last_attempt_time
    }

    /// Key of the failed message chain this entry's failures belong to.
    ///
    /// Events without an entity fall back to a chain of their own.
    pub fn chain_key(&self) -> EntityId {
        self.entity_id
            .clone()
            .unwrap_or_else(|| EntityId::new(self.event_id.to_string()))
    }

    /// True if the entry is `InProgress` and its last attempt started before `cutoff`.
    pub fn is_stale(&self, cutoff: Timestamp) -> bool {
        self.state == EventState::InProgress
            && self
                .last_attempt_time
                .unwrap_or(self.creation_time)
                .is_before(&cutoff)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Moves the entry to `InProgress`, counting the attempt.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` unless the entry is `NotPublished` or `PublishedFailed`
    pub fn mark_in_progress(&mut self) -> Result<(), DomainError> {
        self.state = self.state.transition_to(EventState::InProgress)?;
        self.times_sent = self.times_sent.saturating_add(1);
        self.last_attempt_time = Some(Timestamp::now());
        Ok(())
    }

    /// Records broker acceptance.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` unless the entry is `InProgress`
    pub fn mark_published(&mut self) -> Result<(), DomainError> {
        self.state = self.state.transition_to(EventState::Published)?;
        Ok(())
    }

    /// Records a failed delivery attempt.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` unless the entry is `InProgress`
    pub fn mark_failed(&mut self) -> Result<(), DomainError> {
        self.state = self.state.transition_to(EventState::PublishedFailed)?;
        Ok(())
    }

    /// Restores the event from the snapshot, resolving the kind through `registry`.
    ///
    /// # Errors
    ///
    /// - `UnknownEventKind` if neither the full nor the short kind name is registered
    /// - `DeserializationFailed` if the snapshot does not match the registered type
    pub fn deserialize(&self, registry: &EventRegistry) -> Result<Event, DomainError> {
        registry.decode(&self.event_type_name, &self.content)
    }
}
