//! EventService - Saves events with their business change and publishes them.
//!
//! `save` commits the business entity and its event log entry in one unit of
//! work. `publish` drives the entry through `InProgress` to `Published` or
//! `PublishedFailed` around the broker call. The publisher loop uses the
//! batch operations to drain pending and failed entries.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::domain::event_log::EventLogEntry;
use crate::domain::foundation::{registry, DomainError, ErrorCode, Event, EventRegistry, Timestamp};
use crate::ports::{EntityRepository, EventLogRepository, EventPublisher, TransactionManager};

use super::event_log::EventLog;
use super::unit_of_work::{RetryPolicy, UnitOfWork, Work};

/// Log entry that could not be turned back into an event.
#[derive(Debug, Clone)]
pub struct RejectedEntry {
    pub entry: EventLogEntry,
    pub error: DomainError,
}

/// Entries of one fetch, split into decoded events and rejected entries.
#[derive(Debug, Clone, Default)]
pub struct DecodedBatch {
    pub events: Vec<Event>,
    pub rejected: Vec<RejectedEntry>,
}

impl DecodedBatch {
    pub fn len(&self) -> usize {
        self.events.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.rejected.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    Insert,
    Update,
}

/// Persists the entity and the event log entry in one transaction.
struct SaveWork<'a, Tx: Send + 'static, E, R: ?Sized> {
    mode: SaveMode,
    entities: &'a R,
    entity: &'a mut E,
    event: &'a Event,
    event_log: &'a EventLog<Tx>,
}

#[async_trait]
impl<'a, Tx, E, R> Work<Tx> for SaveWork<'a, Tx, E, R>
where
    Tx: Send + 'static,
    E: Send + Sync,
    R: EntityRepository<Tx, E> + ?Sized,
{
    type Output = Event;

    async fn run(&mut self, tx: &mut Tx) -> Result<Event, DomainError> {
        // Every attempt starts from the caller's event.
        let mut event = self.event.clone();
        let entity_id = match self.mode {
            SaveMode::Insert => self.entities.insert(tx, &mut *self.entity).await?,
            SaveMode::Update => self.entities.update(tx, &*self.entity).await?,
        };
        event.assign_entity_id(entity_id);
        self.event_log.save_event(tx, &event).await?;
        Ok(event)
    }
}

/// Facade over the unit of work, the event log and the broker.
pub struct EventService<M: TransactionManager> {
    unit_of_work: UnitOfWork<M>,
    event_log: EventLog<M::Tx>,
    publisher: Arc<dyn EventPublisher>,
    registry: Arc<EventRegistry>,
    publish_timeout: Option<Duration>,
}

impl<M: TransactionManager> EventService<M> {
    pub fn new(
        manager: Arc<M>,
        event_log: Arc<dyn EventLogRepository<M::Tx>>,
        publisher: Arc<dyn EventPublisher>,
        registry: Arc<EventRegistry>,
    ) -> Self {
        Self {
            unit_of_work: UnitOfWork::new(manager),
            event_log: EventLog::new(event_log),
            publisher,
            registry,
            publish_timeout: None,
        }
    }

    /// Like `new`, decoding with the process-wide registry.
    ///
    /// # Errors
    ///
    /// - `InternalError` if no registry was installed with `registry::install_global`
    pub fn with_global_registry(
        manager: Arc<M>,
        event_log: Arc<dyn EventLogRepository<M::Tx>>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, DomainError> {
        let registry = registry::global().ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                "No global event registry installed",
            )
        })?;
        Ok(Self::new(manager, event_log, publisher, registry))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.unit_of_work = self.unit_of_work.with_retry_policy(policy);
        self
    }

    /// Bounds each broker call; an expired call counts as a failed publish.
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    pub fn event_log(&self) -> &EventLog<M::Tx> {
        &self.event_log
    }

    pub fn is_broker_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Saving
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts `entity` and logs `event` for it in one transaction.
    ///
    /// The event takes the generated entity id unless it already carries one.
    /// Nothing is sent to the broker.
    ///
    /// # Errors
    ///
    /// - `UnknownEventKind` / `DeserializationFailed` if the registry does not
    ///   accept the event (checked before the store is touched)
    /// - any store or repository error once retries are spent
    pub async fn save<E, R>(
        &self,
        entities: &R,
        entity: &mut E,
        event: Event,
    ) -> Result<Event, DomainError>
    where
        E: Send + Sync,
        R: EntityRepository<M::Tx, E> + ?Sized,
    {
        self.save_with(SaveMode::Insert, entities, entity, event).await
    }

    /// Updates an existing `entity` and logs `event` for it in one transaction.
    pub async fn save_changes<E, R>(
        &self,
        entities: &R,
        entity: &mut E,
        event: Event,
    ) -> Result<Event, DomainError>
    where
        E: Send + Sync,
        R: EntityRepository<M::Tx, E> + ?Sized,
    {
        self.save_with(SaveMode::Update, entities, entity, event).await
    }

    /// `save` followed by `publish`.
    ///
    /// A failed publish leaves the committed entry `PublishedFailed` for the
    /// publisher loop and returns the broker error. When the publisher loop
    /// claims the committed entry first, delivery is left to it and the saved
    /// event is returned.
    ///
    /// # Errors
    ///
    /// - any `save` error, in which case nothing was committed
    /// - the broker error once the entry was marked `PublishedFailed`
    pub async fn save_and_publish<E, R>(
        &self,
        entities: &R,
        entity: &mut E,
        event: Event,
    ) -> Result<Event, DomainError>
    where
        E: Send + Sync,
        R: EntityRepository<M::Tx, E> + ?Sized,
    {
        let saved = self.save(entities, entity, event).await?;
        match self.publish(&saved).await {
            Ok(()) => Ok(saved),
            Err(err) if err.code == ErrorCode::InvalidStateTransition => {
                debug!(
                    event_id = %saved.id(),
                    error = %err,
                    "Entry already claimed by another publisher"
                );
                Ok(saved)
            }
            Err(err) => Err(err),
        }
    }

    async fn save_with<E, R>(
        &self,
        mode: SaveMode,
        entities: &R,
        entity: &mut E,
        event: Event,
    ) -> Result<Event, DomainError>
    where
        E: Send + Sync,
        R: EntityRepository<M::Tx, E> + ?Sized,
    {
        self.registry.validate(&event)?;

        let mut work = SaveWork {
            mode,
            entities,
            entity,
            event: &event,
            event_log: &self.event_log,
        };
        let saved = self.unit_of_work.execute(&mut work).await?;
        debug!(
            event_id = %saved.id(),
            kind = saved.kind(),
            entity_id = saved.entity_id().map(|id| id.as_str()).unwrap_or(""),
            "Event saved with its entity"
        );
        Ok(saved)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Publishing
    // ─────────────────────────────────────────────────────────────────────────

    /// Hands a logged event to the broker and records the outcome.
    ///
    /// # Errors
    ///
    /// - `EventLogEntryNotFound` / `InvalidStateTransition` if the entry cannot
    ///   enter `InProgress` (nothing is sent then)
    /// - the broker error after the entry was marked `PublishedFailed`
    pub async fn publish(&self, event: &Event) -> Result<(), DomainError> {
        let entry = self.event_log.mark_in_progress(event.id()).await?;
        debug!(
            event_id = %event.id(),
            kind = event.kind(),
            times_sent = entry.times_sent(),
            "Publishing event"
        );

        match self.send(event).await {
            Ok(()) => {
                self.event_log.mark_published(event.id()).await?;
                info!(event_id = %event.id(), kind = event.kind(), "Event published");
                Ok(())
            }
            Err(err) => {
                warn!(
                    event_id = %event.id(),
                    kind = event.kind(),
                    error = %err,
                    "Event publish failed"
                );
                if let Err(mark_err) = self.event_log.mark_failed(event.id()).await {
                    error!(
                        event_id = %event.id(),
                        error = %mark_err,
                        "Failed to mark event as failed, it stays in progress until reclaimed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn send(&self, event: &Event) -> Result<(), DomainError> {
        match self.publish_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.publisher.publish(event))
                .await
                .map_err(|_| {
                    DomainError::new(
                        ErrorCode::PublishTimeout,
                        format!("Broker did not accept event within {:?}", timeout),
                    )
                    .with_detail("event_id", event.id().to_string())
                })?,
            None => self.publisher.publish(event).await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batches
    // ─────────────────────────────────────────────────────────────────────────

    /// Pending events decoded with the service's registry, oldest first.
    ///
    /// Fails on the first entry that cannot be decoded.
    pub async fn get_pending_events(&self, batch_size: usize) -> Result<Vec<Event>, DomainError> {
        self.get_pending_events_with(batch_size, &self.registry)
            .await
    }

    /// Pending events decoded with a caller-supplied registry.
    pub async fn get_pending_events_with(
        &self,
        batch_size: usize,
        registry: &EventRegistry,
    ) -> Result<Vec<Event>, DomainError> {
        self.event_log
            .retrieve_pending_entries(batch_size)
            .await?
            .iter()
            .map(|entry| self.event_log.deserialize(entry, registry))
            .collect()
    }

    /// Pending entries, with undecodable ones set aside instead of failing the batch.
    pub async fn get_pending_batch(&self, batch_size: usize) -> Result<DecodedBatch, DomainError> {
        let entries = self.event_log.retrieve_pending_entries(batch_size).await?;
        Ok(self.decode(entries))
    }

    /// Failed entries eligible for another attempt, decoded like `get_pending_batch`.
    pub async fn get_republish_candidates(
        &self,
        limit: usize,
        max_auto_attempts: u32,
    ) -> Result<DecodedBatch, DomainError> {
        let entries = self
            .event_log
            .retrieve_republish_candidates(limit, max_auto_attempts)
            .await?;
        Ok(self.decode(entries))
    }

    fn decode(&self, entries: Vec<EventLogEntry>) -> DecodedBatch {
        let mut batch = DecodedBatch::default();
        for entry in entries {
            match self.event_log.deserialize(&entry, &self.registry) {
                Ok(event) => batch.events.push(event),
                Err(error) => batch.rejected.push(RejectedEntry { entry, error }),
            }
        }
        batch
    }

    /// Moves an undecodable entry to `PublishedFailed`, counting the attempt.
    pub async fn reject_entry(&self, entry: &EventLogEntry) -> Result<EventLogEntry, DomainError> {
        self.event_log.mark_in_progress(entry.event_id()).await?;
        let rejected = self.event_log.mark_failed(entry.event_id()).await?;
        warn!(
            event_id = %entry.event_id(),
            kind = entry.event_type_name(),
            "Rejected undecodable event log entry"
        );
        Ok(rejected)
    }

    /// Moves up to `limit` entries stuck `InProgress` for longer than
    /// `older_than` to `PublishedFailed`.
    pub async fn reclaim_stale(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        let cutoff = Timestamp::now().minus(older_than);
        let stale = self
            .event_log
            .retrieve_stale_in_progress(cutoff, limit)
            .await?;

        let mut reclaimed = Vec::with_capacity(stale.len());
        for entry in stale {
            let failed = self.event_log.mark_failed(entry.event_id()).await?;
            warn!(
                event_id = %entry.event_id(),
                kind = entry.event_type_name(),
                times_sent = entry.times_sent(),
                "Reclaimed event stuck in progress"
            );
            reclaimed.push(failed);
        }
        Ok(reclaimed)
    }
}
