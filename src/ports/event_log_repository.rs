//! EventLogRepository port - Persistence for the outbox table.
//!
//! Entries are written inside the caller's business transaction and
//! afterwards only their delivery bookkeeping changes.
//!
//! ## Lifecycle
//!
//! 1. `save_in_tx` inserts a `NotPublished` entry with the business change
//! 2. the event service or publisher loop marks it `InProgress`
//! 3. the broker outcome marks it `Published` or `PublishedFailed`
//! 4. failed entries come back through `retrieve_republish_candidates`

use async_trait::async_trait;

use crate::domain::event_log::EventLogEntry;
use crate::domain::foundation::{DomainError, EventId, Timestamp};

/// Port for reading and updating event log entries.
///
/// The mark operations are single-row read-modify-writes that apply the
/// `EventState` transitions and fail with `EventLogEntryNotFound` or
/// `InvalidStateTransition` without changing the row.
#[async_trait]
pub trait EventLogRepository<Tx: Send>: Send + Sync {
    /// Insert a new entry inside the caller's transaction.
    async fn save_in_tx(&self, tx: &mut Tx, entry: &EventLogEntry) -> Result<(), DomainError>;

    /// Find an entry by event id.
    async fn find(&self, event_id: EventId) -> Result<Option<EventLogEntry>, DomainError>;

    /// Up to `limit` `NotPublished` entries, oldest creation time first.
    async fn retrieve_pending(&self, limit: usize) -> Result<Vec<EventLogEntry>, DomainError>;

    /// Up to `limit` `PublishedFailed` entries eligible for another attempt.
    ///
    /// An entry is eligible when no failed message for its event is marked
    /// `should_skip`, and either its chain is flagged `should_republish` or
    /// it has been sent fewer than `max_auto_attempts` times. Oldest first.
    async fn retrieve_republish_candidates(
        &self,
        limit: usize,
        max_auto_attempts: u32,
    ) -> Result<Vec<EventLogEntry>, DomainError>;

    /// Up to `limit` `InProgress` entries whose last attempt started before `older_than`.
    async fn retrieve_stale_in_progress(
        &self,
        older_than: Timestamp,
        limit: usize,
    ) -> Result<Vec<EventLogEntry>, DomainError>;

    /// Move the entry to `InProgress`, incrementing its times-sent counter.
    async fn mark_in_progress(&self, event_id: EventId) -> Result<EventLogEntry, DomainError>;

    /// Move the entry from `InProgress` to `Published`.
    async fn mark_published(&self, event_id: EventId) -> Result<EventLogEntry, DomainError>;

    /// Move the entry from `InProgress` to `PublishedFailed`.
    async fn mark_failed(&self, event_id: EventId) -> Result<EventLogEntry, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn EventLogRepository<()>) {}
}
