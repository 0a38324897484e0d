//! EventLog - Application-facing access to the outbox table.

use std::sync::Arc;
use tracing::debug;

use crate::domain::event_log::EventLogEntry;
use crate::domain::foundation::{DomainError, Event, EventId, EventRegistry, Timestamp};
use crate::ports::EventLogRepository;

/// Saves, reads and transitions event log entries.
pub struct EventLog<Tx: Send + 'static> {
    repository: Arc<dyn EventLogRepository<Tx>>,
}

impl<Tx: Send + 'static> Clone for EventLog<Tx> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<Tx: Send + 'static> EventLog<Tx> {
    pub fn new(repository: Arc<dyn EventLogRepository<Tx>>) -> Self {
        Self { repository }
    }

    /// Snapshots the event into a `NotPublished` entry inside the caller's transaction.
    pub async fn save_event(
        &self,
        tx: &mut Tx,
        event: &Event,
    ) -> Result<EventLogEntry, DomainError> {
        let entry = EventLogEntry::new(event)?;
        self.repository.save_in_tx(tx, &entry).await?;
        debug!(event_id = %entry.event_id(), kind = entry.event_type_name(), "Event saved to log");
        Ok(entry)
    }

    pub async fn find(&self, event_id: EventId) -> Result<Option<EventLogEntry>, DomainError> {
        self.repository.find(event_id).await
    }

    /// Up to `batch_size` `NotPublished` entries, oldest first.
    pub async fn retrieve_pending_entries(
        &self,
        batch_size: usize,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        self.repository.retrieve_pending(batch_size).await
    }

    pub async fn retrieve_republish_candidates(
        &self,
        limit: usize,
        max_auto_attempts: u32,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        self.repository
            .retrieve_republish_candidates(limit, max_auto_attempts)
            .await
    }

    pub async fn retrieve_stale_in_progress(
        &self,
        older_than: Timestamp,
        limit: usize,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        self.repository
            .retrieve_stale_in_progress(older_than, limit)
            .await
    }

    pub async fn mark_in_progress(&self, event_id: EventId) -> Result<EventLogEntry, DomainError> {
        self.repository.mark_in_progress(event_id).await
    }

    pub async fn mark_published(&self, event_id: EventId) -> Result<EventLogEntry, DomainError> {
        self.repository.mark_published(event_id).await
    }

    pub async fn mark_failed(&self, event_id: EventId) -> Result<EventLogEntry, DomainError> {
        self.repository.mark_failed(event_id).await
    }

    /// Restores the entry's event through `registry`.
    pub fn deserialize(
        &self,
        entry: &EventLogEntry,
        registry: &EventRegistry,
    ) -> Result<Event, DomainError> {
        entry.deserialize(registry)
    }
}
