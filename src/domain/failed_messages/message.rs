//! Failed message entity and the failure record it is built from.

use crate::domain::event_log::EventLogEntry;
use crate::domain::foundation::{
    DomainError, EntityId, Event, EventId, FailedMessageChainId, FailedMessageId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// One recorded delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMessage {
    id: FailedMessageId,
    chain_id: FailedMessageChainId,
    event_id: EventId,
    creation_time: Timestamp,

    /// Serialized event as it was when delivery failed.
    body: String,

    /// Error message reported by the failing component.
    message: Option<String>,

    /// Error detail (code and context) for operators.
    stack_trace: Option<String>,

    should_skip: bool,
}

impl FailedMessage {
    /// Materializes a record once the store has assigned ids.
    pub fn from_record(
        id: FailedMessageId,
        chain_id: FailedMessageChainId,
        record: FailureRecord,
    ) -> Self {
        Self {
            id,
            chain_id,
            event_id: record.event_id,
            creation_time: record.creation_time,
            body: record.body,
            message: record.message,
            stack_trace: record.stack_trace,
            should_skip: record.should_skip,
        }
    }

    /// Reconstitute a failed message from persistence.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: FailedMessageId,
        chain_id: FailedMessageChainId,
        event_id: EventId,
        creation_time: Timestamp,
        body: String,
        message: Option<String>,
        stack_trace: Option<String>,
        should_skip: bool,
    ) -> Self {
        Self {
            id,
            chain_id,
            event_id,
            creation_time,
            body,
            message,
            stack_trace,
            should_skip,
        }
    }

    pub fn id(&self) -> FailedMessageId {
        self.id
    }

    pub fn chain_id(&self) -> FailedMessageChainId {
        self.chain_id
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn creation_time(&self) -> Timestamp {
        self.creation_time
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn should_skip(&self) -> bool {
        self.should_skip
    }

    pub fn set_should_skip(&mut self, value: bool) {
        self.should_skip = value;
    }
}

/// A failure waiting to be appended to its entity's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub entity_id: EntityId,
    pub event_id: EventId,
    pub creation_time: Timestamp,
    pub body: String,
    pub message: Option<String>,
    pub stack_trace: Option<String>,

    /// Keeps the event out of republishing from the start.
    pub should_skip: bool,
}

impl FailureRecord {
    /// Builds a record for an event whose publish failed.
    ///
    /// Events without an entity id get a chain keyed by their own id.
    pub fn from_event(event: &Event, error: &DomainError) -> Self {
        let body = event
            .to_json()
            .unwrap_or_else(|_| event.payload().to_string());
        Self {
            entity_id: event
                .entity_id()
                .cloned()
                .unwrap_or_else(|| EntityId::new(event.id().to_string())),
            event_id: event.id(),
            creation_time: Timestamp::now(),
            body,
            message: Some(error.message.clone()),
            stack_trace: Some(describe(error)),
            should_skip: false,
        }
    }

    /// Builds a record for a log entry that could not be decoded.
    ///
    /// Retrying an unresolvable kind cannot succeed, so the record is marked
    /// `should_skip`; an operator clears the flag once the kind is registered.
    pub fn from_entry(entry: &EventLogEntry, error: &DomainError) -> Self {
        Self {
            entity_id: entry.chain_key(),
            event_id: entry.event_id(),
            creation_time: Timestamp::now(),
            body: entry.content().to_string(),
            message: Some(error.message.clone()),
            stack_trace: Some(describe(error)),
            should_skip: true,
        }
    }
}

fn describe(error: &DomainError) -> String {
    let mut details: Vec<_> = error.details.iter().collect();
    details.sort();
    let details = details
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    if details.is_empty() {
        error.to_string()
    } else {
        format!("{} ({})", error, details)
    }
}
