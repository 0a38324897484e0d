//! OutboxPublisher - Background service for reliable event delivery.
//!
//! This service implements the second half of the Transactional Outbox Pattern:
//! 1. The event service writes events to the log (same transaction as domain changes)
//! 2. **OutboxPublisher polls the log and publishes to the message broker** ← This module
//!
//! ## Cycle
//!
//! 1. Reclaim entries stuck `InProgress` past `in_progress_timeout`
//! 2. Fetch up to `batch_size` pending entries
//! 3. Fetch up to `chain_batch_size` failed entries eligible for republishing
//! 4. Reject undecodable entries and record them as failures
//! 5. Publish fresh events first, then republish candidates; record each failure
//!    under the entity's failed message chain
//!
//! An empty cycle sleeps `idle_delay`; otherwise the next cycle starts at once.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `batch_size` | 1000 | Max pending events per cycle |
//! | `chain_batch_size` | 100 | Max republish candidates per cycle |
//! | `idle_delay` | 1s | Sleep after a cycle with nothing to do |
//! | `connection_check_interval` | 100ms | Broker readiness polling interval |
//! | `max_auto_attempts` | 3 | Sends before a failure needs an operator |
//! | `in_progress_timeout` | 5min | Age after which `InProgress` is reclaimed |
//!
//! ## Graceful Shutdown
//!
//! The service listens for a shutdown signal between events and during every
//! sleep. A publish already handed to the broker finishes first.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::application::{DecodedBatch, EventService, RejectedEntry};
use crate::domain::failed_messages::FailureRecord;
use crate::domain::foundation::{DomainError, Event};
use crate::ports::{FailedMessageRepository, TransactionManager};

/// Configuration for the OutboxPublisher service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxPublisherConfig {
    /// Maximum pending events to process per cycle.
    pub batch_size: usize,

    /// Maximum failed events to republish per cycle.
    pub chain_batch_size: usize,

    /// How long to sleep after a cycle with nothing to publish.
    pub idle_delay: Duration,

    /// How often to check broker readiness while waiting for it.
    pub connection_check_interval: Duration,

    /// Sends after which a failed event waits for `should_republish`.
    pub max_auto_attempts: u32,

    /// Age after which an `InProgress` entry counts as abandoned.
    pub in_progress_timeout: Option<Duration>,
}

impl Default for OutboxPublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            chain_batch_size: 100,
            idle_delay: Duration::from_millis(1000),
            connection_check_interval: Duration::from_millis(100),
            max_auto_attempts: 3,
            in_progress_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl OutboxPublisherConfig {
    /// Create config with custom batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Create config with custom chain batch size.
    pub fn with_chain_batch_size(mut self, size: usize) -> Self {
        self.chain_batch_size = size;
        self
    }

    /// Create config with custom idle delay.
    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Create config with custom broker check interval.
    pub fn with_connection_check_interval(mut self, interval: Duration) -> Self {
        self.connection_check_interval = interval;
        self
    }

    pub fn with_max_auto_attempts(mut self, attempts: u32) -> Self {
        self.max_auto_attempts = attempts;
        self
    }

    /// `None` disables reclaiming of stale `InProgress` entries.
    pub fn with_in_progress_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.in_progress_timeout = timeout;
        self
    }
}

/// What the publisher loop is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    WaitingForBroker,
    Polling,
    IdleBackoff,
    Stopped,
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublisherState::WaitingForBroker => "waiting_for_broker",
            PublisherState::Polling => "polling",
            PublisherState::IdleBackoff => "idle_backoff",
            PublisherState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Pending entries fetched, decodable or not.
    pub pending: usize,
    /// Republish candidates fetched, decodable or not.
    pub republished: usize,
    pub published: usize,
    pub failed: usize,
    /// Undecodable entries moved to `PublishedFailed`.
    pub rejected: usize,
    /// Stale `InProgress` entries moved to `PublishedFailed`.
    pub reclaimed: usize,
}

impl CycleReport {
    /// Entries this cycle tried to deliver or reject.
    pub fn attempted(&self) -> usize {
        self.published + self.failed + self.rejected
    }
}

/// Background service that publishes events from the event log.
///
/// Drives the event service against the configured broker and escalates
/// failed deliveries to the failed message store.
pub struct OutboxPublisher<M: TransactionManager> {
    service: Arc<EventService<M>>,
    failures: Arc<dyn FailedMessageRepository>,
    config: OutboxPublisherConfig,
    state: watch::Sender<PublisherState>,
}

impl<M: TransactionManager> OutboxPublisher<M> {
    /// Create a new OutboxPublisher with default configuration.
    pub fn new(service: Arc<EventService<M>>, failures: Arc<dyn FailedMessageRepository>) -> Self {
        Self::with_config(service, failures, OutboxPublisherConfig::default())
    }

    /// Create a new OutboxPublisher with custom configuration.
    pub fn with_config(
        service: Arc<EventService<M>>,
        failures: Arc<dyn FailedMessageRepository>,
        config: OutboxPublisherConfig,
    ) -> Self {
        let (state, _) = watch::channel(PublisherState::Stopped);
        Self {
            service,
            failures,
            config,
            state,
        }
    }

    pub fn config(&self) -> &OutboxPublisherConfig {
        &self.config
    }

    /// Current loop state.
    pub fn state(&self) -> PublisherState {
        *self.state.borrow()
    }

    /// Receiver that observes every loop state change.
    pub fn state_receiver(&self) -> watch::Receiver<PublisherState> {
        self.state.subscribe()
    }

    /// Run the publisher loop until shutdown signal is received.
    ///
    /// A dropped shutdown sender also stops the loop.
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` on graceful shutdown. Store failures inside a cycle
    /// are logged and retried after `idle_delay`; they never end the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DomainError> {
        info!(
            batch_size = self.config.batch_size,
            chain_batch_size = self.config.chain_batch_size,
            max_auto_attempts = self.config.max_auto_attempts,
            "Outbox publisher started"
        );

        while !stop_requested(&shutdown) {
            if !self.service.is_broker_connected() {
                self.set_state(PublisherState::WaitingForBroker);
                if sleep_or_shutdown(self.config.connection_check_interval, &mut shutdown).await {
                    break;
                }
                continue;
            }

            self.set_state(PublisherState::Polling);
            let attempted = match self.cycle(Some(&shutdown)).await {
                Ok(report) => report.attempted(),
                Err(err) => {
                    error!(error = %err, code = %err.code, "Outbox publisher cycle failed");
                    0
                }
            };

            if attempted == 0 {
                self.set_state(PublisherState::IdleBackoff);
                if sleep_or_shutdown(self.config.idle_delay, &mut shutdown).await {
                    break;
                }
            }
        }

        self.set_state(PublisherState::Stopped);
        info!("Outbox publisher stopped");
        Ok(())
    }

    /// Run exactly one poll cycle.
    ///
    /// Does not wait for the broker. Useful for tests and for callers that
    /// drive the loop themselves.
    pub async fn poll_once(&self) -> Result<CycleReport, DomainError> {
        self.cycle(None).await
    }

    async fn cycle(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<CycleReport, DomainError> {
        let mut report = CycleReport::default();

        if let Some(timeout) = self.config.in_progress_timeout {
            report.reclaimed = self
                .service
                .reclaim_stale(timeout, self.config.batch_size)
                .await?
                .len();
        }

        let pending = self.service.get_pending_batch(self.config.batch_size).await?;
        let republish = self
            .service
            .get_republish_candidates(self.config.chain_batch_size, self.config.max_auto_attempts)
            .await?;
        report.pending = pending.len();
        report.republished = republish.len();

        let DecodedBatch {
            events: fresh,
            rejected: mut rejected_entries,
        } = pending;
        rejected_entries.extend(republish.rejected);

        for rejected in &rejected_entries {
            self.reject(rejected, &mut report).await;
        }

        for event in fresh.iter().chain(republish.events.iter()) {
            if shutdown.map_or(false, stop_requested) {
                debug!("Shutdown requested, leaving the rest of the batch for later");
                break;
            }
            self.deliver(event, &mut report).await;
        }

        if report.attempted() > 0 || report.reclaimed > 0 {
            info!(
                pending = report.pending,
                republished = report.republished,
                published = report.published,
                failed = report.failed,
                rejected = report.rejected,
                reclaimed = report.reclaimed,
                "Outbox publisher cycle complete"
            );
        }
        Ok(report)
    }

    async fn deliver(&self, event: &Event, report: &mut CycleReport) {
        match self.service.publish(event).await {
            Ok(()) => report.published += 1,
            Err(err) => {
                report.failed += 1;
                if err.is_broker_fault() {
                    self.record_failure(FailureRecord::from_event(event, &err))
                        .await;
                } else {
                    warn!(
                        event_id = %event.id(),
                        kind = event.kind(),
                        error = %err,
                        "Event skipped, log entry could not be updated"
                    );
                }
            }
        }
    }

    async fn reject(&self, rejected: &RejectedEntry, report: &mut CycleReport) {
        match self.service.reject_entry(&rejected.entry).await {
            Ok(_) => {
                report.rejected += 1;
                self.record_failure(FailureRecord::from_entry(&rejected.entry, &rejected.error))
                    .await;
            }
            Err(err) => {
                error!(
                    event_id = %rejected.entry.event_id(),
                    error = %err,
                    "Failed to reject undecodable event log entry"
                );
            }
        }
    }

    async fn record_failure(&self, record: FailureRecord) {
        let event_id = record.event_id;
        let entity_id = record.entity_id.clone();
        match self.failures.record_failure(record).await {
            Ok(message) => {
                warn!(
                    event_id = %event_id,
                    entity_id = %entity_id,
                    chain_id = message.chain_id().value(),
                    "Delivery failure recorded"
                );
            }
            Err(err) => {
                error!(
                    event_id = %event_id,
                    entity_id = %entity_id,
                    error = %err,
                    "Failed to record delivery failure"
                );
            }
        }
    }

    fn set_state(&self, next: PublisherState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Outbox publisher state changed");
        }
    }
}

fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Sleeps for `duration` unless shutdown arrives first. Returns true on shutdown.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = time::sleep(duration) => stop_requested(shutdown),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
