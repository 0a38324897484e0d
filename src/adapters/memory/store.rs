//! In-memory outbox store.
//!
//! This adapter implements the store ports (`TransactionManager`,
//! `EventLogRepository`, `FailedMessageRepository`) over shared in-process
//! state. Useful for:
//! - Unit and integration tests
//! - Demonstrations without a database
//!
//! Transactions buffer their writes and apply them under a single lock on
//! commit, so readers never observe a half-applied unit of work. Dropping an
//! `InMemoryTx` discards its buffer, which is the rollback.
//!
//! Business entities are stored as JSON rows in named tables so tests can
//! check save atomicity without defining their own store.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::event_log::{EventLogEntry, EventState};
use crate::domain::failed_messages::{FailedMessage, FailedMessageChain, FailureRecord};
use crate::domain::foundation::{
    DomainError, EntityId, ErrorCode, EventId, FailedMessageChainId, FailedMessageId, Timestamp,
};
use crate::ports::{EventLogRepository, FailedMessageRepository, TransactionManager};

#[derive(Default)]
struct State {
    event_log: HashMap<EventId, EventLogEntry>,
    chains: BTreeMap<FailedMessageChainId, FailedMessageChain>,
    messages: BTreeMap<FailedMessageId, FailedMessage>,
    tables: HashMap<String, BTreeMap<String, JsonValue>>,
}

impl State {
    fn chain_for(&self, entity_id: &EntityId) -> Option<&FailedMessageChain> {
        self.chains.values().find(|c| c.entity_id() == entity_id)
    }

    fn is_skipped(&self, event_id: EventId) -> bool {
        self.messages
            .values()
            .any(|m| m.event_id() == event_id && m.should_skip())
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    sequence: AtomicI64,
    commits_to_fail: AtomicU32,
    commit_attempts: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Transaction handle of the in-memory store.
///
/// Writes are buffered until `commit`; dropping the handle discards them.
pub struct InMemoryTx {
    shared: Arc<Shared>,
    entries: Vec<EventLogEntry>,
    rows: Vec<(String, String, JsonValue)>,
}

impl InMemoryTx {
    /// Buffers a business row for `table`, replacing any row with the same id on commit.
    pub fn stage_row(&mut self, table: &str, id: impl Into<String>, row: JsonValue) {
        self.rows.push((table.to_string(), id.into(), row));
    }

    /// Draws the next value of the store-wide sequence (for generated keys).
    pub fn next_sequence(&self) -> i64 {
        self.shared.next_id()
    }

    /// Number of writes buffered so far.
    pub fn pending_writes(&self) -> usize {
        self.entries.len() + self.rows.len()
    }
}

/// Shared in-memory store. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a transient fault.
    pub fn fail_next_commits(&self, count: u32) {
        self.shared.commits_to_fail.store(count, Ordering::SeqCst);
    }

    /// Number of commits attempted, including injected failures.
    pub fn commit_attempts(&self) -> u64 {
        self.shared.commit_attempts.load(Ordering::SeqCst)
    }

    /// Returns a committed business row.
    pub fn row(&self, table: &str, id: &str) -> Option<JsonValue> {
        self.shared
            .state()
            .tables
            .get(table)
            .and_then(|rows| rows.get(id).cloned())
    }

    /// Number of committed rows in a business table.
    pub fn row_count(&self, table: &str) -> usize {
        self.shared
            .state()
            .tables
            .get(table)
            .map_or(0, BTreeMap::len)
    }

    /// All event log entries, oldest first.
    pub fn entries(&self) -> Vec<EventLogEntry> {
        let mut entries: Vec<_> = self.shared.state().event_log.values().cloned().collect();
        sort_oldest_first(&mut entries);
        entries
    }

    /// Inserts an entry directly, bypassing transactions.
    ///
    /// Used to seed entries in states or shapes the normal save path
    /// never produces (for example undecodable snapshots).
    pub fn seed_entry(&self, entry: EventLogEntry) {
        self.shared.state().event_log.insert(entry.event_id(), entry);
    }

    fn try_commit(&self, tx: InMemoryTx) -> Result<(), DomainError> {
        self.shared.commit_attempts.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .shared
            .commits_to_fail
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DomainError::transient("Injected commit failure"));
        }

        let mut state = self.shared.state();

        let mut seen = HashSet::new();
        for entry in &tx.entries {
            if state.event_log.contains_key(&entry.event_id()) || !seen.insert(entry.event_id()) {
                return Err(DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Duplicate event log entry {}", entry.event_id()),
                )
                .with_detail("event_id", entry.event_id().to_string()));
            }
        }

        for entry in tx.entries {
            state.event_log.insert(entry.event_id(), entry);
        }
        for (table, id, row) in tx.rows {
            state.tables.entry(table).or_default().insert(id, row);
        }
        Ok(())
    }

    fn update_entry(
        &self,
        event_id: EventId,
        apply: impl FnOnce(&mut EventLogEntry) -> Result<(), DomainError>,
    ) -> Result<EventLogEntry, DomainError> {
        let mut state = self.shared.state();
        let stored = state
            .event_log
            .get_mut(&event_id)
            .ok_or_else(|| not_found(event_id))?;

        let mut updated = stored.clone();
        apply(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }
}

fn not_found(event_id: EventId) -> DomainError {
    DomainError::new(
        ErrorCode::EventLogEntryNotFound,
        format!("Event log entry {} not found", event_id),
    )
    .with_detail("event_id", event_id.to_string())
}

fn sort_oldest_first(entries: &mut [EventLogEntry]) {
    entries.sort_by(|a, b| {
        a.creation_time()
            .cmp(&b.creation_time())
            .then_with(|| a.event_id().cmp(&b.event_id()))
    });
}

fn select(
    state: &State,
    limit: usize,
    keep: impl Fn(&EventLogEntry) -> bool,
) -> Vec<EventLogEntry> {
    let mut entries: Vec<_> = state
        .event_log
        .values()
        .filter(|e| keep(e))
        .cloned()
        .collect();
    sort_oldest_first(&mut entries);
    entries.truncate(limit);
    entries
}

#[async_trait]
impl TransactionManager for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, DomainError> {
        Ok(InMemoryTx {
            shared: Arc::clone(&self.shared),
            entries: Vec::new(),
            rows: Vec::new(),
        })
    }

    async fn commit(&self, tx: InMemoryTx) -> Result<(), DomainError> {
        self.try_commit(tx)
    }

    async fn rollback(&self, tx: InMemoryTx) -> Result<(), DomainError> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl EventLogRepository<InMemoryTx> for InMemoryStore {
    async fn save_in_tx(
        &self,
        tx: &mut InMemoryTx,
        entry: &EventLogEntry,
    ) -> Result<(), DomainError> {
        tx.entries.push(entry.clone());
        Ok(())
    }

    async fn find(&self, event_id: EventId) -> Result<Option<EventLogEntry>, DomainError> {
        Ok(self.shared.state().event_log.get(&event_id).cloned())
    }

    async fn retrieve_pending(&self, limit: usize) -> Result<Vec<EventLogEntry>, DomainError> {
        let state = self.shared.state();
        Ok(select(&state, limit, |e| e.state() == EventState::NotPublished))
    }

    async fn retrieve_republish_candidates(
        &self,
        limit: usize,
        max_auto_attempts: u32,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        let state = self.shared.state();
        Ok(select(&state, limit, |e| {
            if e.state() != EventState::PublishedFailed || state.is_skipped(e.event_id()) {
                return false;
            }
            let flagged = state
                .chain_for(&e.chain_key())
                .map_or(false, FailedMessageChain::should_republish);
            flagged || e.times_sent() < max_auto_attempts
        }))
    }

    async fn retrieve_stale_in_progress(
        &self,
        older_than: Timestamp,
        limit: usize,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        let state = self.shared.state();
        Ok(select(&state, limit, |e| e.is_stale(older_than)))
    }

    async fn mark_in_progress(&self, event_id: EventId) -> Result<EventLogEntry, DomainError> {
        self.update_entry(event_id, EventLogEntry::mark_in_progress)
    }

    async fn mark_published(&self, event_id: EventId) -> Result<EventLogEntry, DomainError> {
        self.update_entry(event_id, EventLogEntry::mark_published)
    }

    async fn mark_failed(&self, event_id: EventId) -> Result<EventLogEntry, DomainError> {
        self.update_entry(event_id, EventLogEntry::mark_failed)
    }
}

#[async_trait]
impl FailedMessageRepository for InMemoryStore {
    async fn record_failure(&self, record: FailureRecord) -> Result<FailedMessage, DomainError> {
        let mut state = self.shared.state();

        let existing = state
            .chain_for(&record.entity_id)
            .map(FailedMessageChain::id);
        let chain_id = match existing {
            Some(id) => id,
            None => {
                let chain = FailedMessageChain::new(
                    FailedMessageChainId::new(self.shared.next_id()),
                    record.entity_id.clone(),
                );
                let id = chain.id();
                state.chains.insert(id, chain);
                id
            }
        };

        let message = FailedMessage::from_record(
            FailedMessageId::new(self.shared.next_id()),
            chain_id,
            record,
        );
        state.messages.insert(message.id(), message.clone());
        Ok(message)
    }

    async fn find_chain(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<FailedMessageChain>, DomainError> {
        Ok(self.shared.state().chain_for(entity_id).cloned())
    }

    async fn list_chains(&self, limit: usize) -> Result<Vec<FailedMessageChain>, DomainError> {
        Ok(self
            .shared
            .state()
            .chains
            .values()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_messages(
        &self,
        chain_id: FailedMessageChainId,
    ) -> Result<Vec<FailedMessage>, DomainError> {
        Ok(self
            .shared
            .state()
            .messages
            .values()
            .filter(|m| m.chain_id() == chain_id)
            .cloned()
            .collect())
    }

    async fn set_should_republish(
        &self,
        chain_id: FailedMessageChainId,
        value: bool,
    ) -> Result<FailedMessageChain, DomainError> {
        let mut state = self.shared.state();
        let chain = state.chains.get_mut(&chain_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::FailedMessageChainNotFound,
                format!("Failed message chain {} not found", chain_id),
            )
        })?;
        chain.set_should_republish(value);
        Ok(chain.clone())
    }

    async fn set_should_skip(
        &self,
        message_id: FailedMessageId,
        value: bool,
    ) -> Result<FailedMessage, DomainError> {
        let mut state = self.shared.state();
        let message = state.messages.get_mut(&message_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::FailedMessageNotFound,
                format!("Failed message {} not found", message_id),
            )
        })?;
        message.set_should_skip(value);
        Ok(message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Event;
    use serde_json::json;

    fn entry_at(offset_ms: i64, entity: &str) -> EventLogEntry {
        let event = Event::raw("orders.OrderCreated", json!({"n": offset_ms}))
            .with_entity_id(entity)
            .with_created_at(Timestamp::now().plus_millis(offset_ms));
        EventLogEntry::new(&event).unwrap()
    }

    async fn save(store: &InMemoryStore, entry: &EventLogEntry) {
        let mut tx = store.begin().await.unwrap();
        store.save_in_tx(&mut tx, entry).await.unwrap();
        store.commit(tx).await.unwrap();
    }

    // ============================================================
    // Transaction Tests
    // ============================================================

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = InMemoryStore::new();
        let entry = entry_at(0, "E1");

        let mut tx = store.begin().await.unwrap();
        store.save_in_tx(&mut tx, &entry).await.unwrap();
        tx.stage_row("orders", "E1", json!({"id": "E1"}));
        assert_eq!(tx.pending_writes(), 2);

        assert!(store.find(entry.event_id()).await.unwrap().is_none());
        store.commit(tx).await.unwrap();

        assert!(store.find(entry.event_id()).await.unwrap().is_some());
        assert_eq!(store.row("orders", "E1"), Some(json!({"id": "E1"})));
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        let entry = entry_at(0, "E1");
        {
            let mut tx = store.begin().await.unwrap();
            store.save_in_tx(&mut tx, &entry).await.unwrap();
            tx.stage_row("orders", "E1", json!({}));
        }
        assert!(store.entries().is_empty());
        assert_eq!(store.row_count("orders"), 0);
    }

    #[tokio::test]
    async fn injected_commit_failure_is_transient_and_applies_nothing() {
        let store = InMemoryStore::new();
        store.fail_next_commits(1);

        let mut tx = store.begin().await.unwrap();
        store.save_in_tx(&mut tx, &entry_at(0, "E1")).await.unwrap();
        let err = store.commit(tx).await.unwrap_err();

        assert!(err.is_transient());
        assert!(store.entries().is_empty());
        assert_eq!(store.commit_attempts(), 1);

        save(&store, &entry_at(0, "E1")).await;
        assert_eq!(store.entries().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_event_id_rejects_whole_commit() {
        let store = InMemoryStore::new();
        let entry = entry_at(0, "E1");
        save(&store, &entry).await;

        let mut tx = store.begin().await.unwrap();
        tx.stage_row("orders", "E2", json!({}));
        store.save_in_tx(&mut tx, &entry).await.unwrap();
        let err = store.commit(tx).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.is_transient());
        assert_eq!(store.row_count("orders"), 0);
    }

    // ============================================================
    // Event Log Tests
    // ============================================================

    #[tokio::test]
    async fn pending_entries_come_oldest_first_up_to_limit() {
        let store = InMemoryStore::new();
        for offset in [40, 10, 30, 0, 20] {
            save(&store, &entry_at(offset, "E1")).await;
        }

        let pending = store.retrieve_pending(2).await.unwrap();
        let all = store.entries();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0], all[0]);
        assert_eq!(pending[1], all[1]);
    }

    #[tokio::test]
    async fn mark_operations_follow_state_machine() {
        let store = InMemoryStore::new();
        let entry = entry_at(0, "E1");
        save(&store, &entry).await;
        let id = entry.event_id();

        let err = store.mark_published(id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        assert_eq!(
            store.find(id).await.unwrap().unwrap().state(),
            EventState::NotPublished
        );

        assert_eq!(store.mark_in_progress(id).await.unwrap().times_sent(), 1);
        assert_eq!(
            store.mark_failed(id).await.unwrap().state(),
            EventState::PublishedFailed
        );
        assert!(store.retrieve_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn marking_unknown_entry_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.mark_in_progress(EventId::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EventLogEntryNotFound);
    }

    #[tokio::test]
    async fn republish_candidates_respect_attempts_flag_and_skip() {
        let store = InMemoryStore::new();
        let entry = entry_at(0, "E1");
        save(&store, &entry).await;
        let id = entry.event_id();

        for _ in 0..2 {
            store.mark_in_progress(id).await.unwrap();
            store.mark_failed(id).await.unwrap();
        }
        assert!(store.retrieve_republish_candidates(10, 2).await.unwrap().is_empty());
        assert_eq!(store.retrieve_republish_candidates(10, 3).await.unwrap().len(), 1);

        let failed = store.find(id).await.unwrap().unwrap();
        let mut record =
            FailureRecord::from_entry(&failed, &DomainError::new(ErrorCode::PublishFailed, "nack"));
        record.should_skip = false;
        let message = store.record_failure(record).await.unwrap();
        store.set_should_republish(message.chain_id(), true).await.unwrap();
        assert_eq!(store.retrieve_republish_candidates(10, 2).await.unwrap().len(), 1);

        store.set_should_skip(message.id(), true).await.unwrap();
        assert!(store.retrieve_republish_candidates(10, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_entries_are_in_progress_past_cutoff() {
        let store = InMemoryStore::new();
        let entry = entry_at(0, "E1");
        save(&store, &entry).await;
        store.mark_in_progress(entry.event_id()).await.unwrap();

        let cutoff = Timestamp::now().plus_millis(1_000);
        assert_eq!(store.retrieve_stale_in_progress(cutoff, 10).await.unwrap().len(), 1);

        let cutoff = Timestamp::now().plus_millis(-60_000);
        assert!(store.retrieve_stale_in_progress(cutoff, 10).await.unwrap().is_empty());
    }

    // ============================================================
    // Failed Message Tests
    // ============================================================

    #[tokio::test]
    async fn failures_for_one_entity_share_a_chain() {
        let store = InMemoryStore::new();
        let error = DomainError::new(ErrorCode::PublishFailed, "nack");

        let first = store
            .record_failure(FailureRecord::from_entry(&entry_at(0, "E1"), &error))
            .await
            .unwrap();
        store.set_should_republish(first.chain_id(), true).await.unwrap();
        let second = store
            .record_failure(FailureRecord::from_entry(&entry_at(1, "E1"), &error))
            .await
            .unwrap();
        let other = store
            .record_failure(FailureRecord::from_entry(&entry_at(2, "E2"), &error))
            .await
            .unwrap();

        assert_eq!(first.chain_id(), second.chain_id());
        assert_ne!(first.chain_id(), other.chain_id());
        assert_eq!(store.list_messages(first.chain_id()).await.unwrap().len(), 2);
        assert_eq!(store.list_chains(10).await.unwrap().len(), 2);

        let chain = store.find_chain(&EntityId::new("E1")).await.unwrap().unwrap();
        assert!(chain.should_republish());
    }

    #[tokio::test]
    async fn operator_actions_on_missing_records_fail() {
        let store = InMemoryStore::new();
        let err = store
            .set_should_republish(FailedMessageChainId::new(99), true)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FailedMessageChainNotFound);

        let err = store
            .set_should_skip(FailedMessageId::new(99), true)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FailedMessageNotFound);
    }
}
