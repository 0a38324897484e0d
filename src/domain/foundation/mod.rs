//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the event model, the kind registry
//! and error types that form the vocabulary of the outbox domain.

mod errors;
mod events;
mod ids;
pub mod registry;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode};
pub use events::{short_kind_name, Event, IntegrationEvent};
pub use ids::{EntityId, EventId, FailedMessageChainId, FailedMessageId};
pub use registry::EventRegistry;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
