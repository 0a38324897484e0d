//! EventPublisher port - Interface for handing events to the message broker.
//!
//! This port defines how the outbox delivers events without knowing
//! about the underlying transport mechanism (in-memory, Redis, etc.).

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Event};

/// Port for publishing events to the broker.
///
/// Implementations must ensure:
/// - `publish` returns only after the broker accepted the event
/// - Network failures, negative acknowledgements and serialization
///   failures are returned as errors, never swallowed
///
/// # Example
///
/// ```ignore
/// let event = Event::new(&OrderCreated { .. })?;
/// publisher.publish(&event).await?;
/// ```
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: &Event) -> Result<(), DomainError>;

    /// Publish multiple events in order, stopping at the first failure.
    async fn publish_all(&self, events: &[Event]) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }

    /// Reports whether the broker connection is ready to accept events.
    fn is_connected(&self) -> bool {
        true
    }
}
