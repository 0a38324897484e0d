//! PostgreSQL implementation of EventLogRepository.
//!
//! Entries live in `event_log`. Mark operations lock the row with
//! `SELECT ... FOR UPDATE`, apply the state machine in memory and write back
//! state, times sent and last attempt time in their own transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::event_log::{EventLogEntry, EventState};
use crate::domain::foundation::{DomainError, EntityId, ErrorCode, EventId, Timestamp};
use crate::ports::EventLogRepository;

use super::errors::map_sqlx_error;
use super::store::{PgTx, PostgresStore};

#[async_trait]
impl EventLogRepository<PgTx> for PostgresStore {
    async fn save_in_tx(&self, tx: &mut PgTx, entry: &EventLogEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO event_log (
                event_id, event_type_name, entity_id, content, state,
                times_sent, creation_time, last_attempt_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.event_id().as_uuid())
        .bind(entry.event_type_name())
        .bind(entry.entity_id().map(EntityId::as_str))
        .bind(entry.content())
        .bind(entry.state().as_str())
        .bind(times_sent_column(entry.times_sent()))
        .bind(entry.creation_time().as_datetime())
        .bind(entry.last_attempt_time().map(|t| *t.as_datetime()))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find(&self, event_id: EventId) -> Result<Option<EventLogEntry>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT event_id, event_type_name, entity_id, content, state,
                   times_sent, creation_time, last_attempt_time
            FROM event_log
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn retrieve_pending(&self, limit: usize) -> Result<Vec<EventLogEntry>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type_name, entity_id, content, state,
                   times_sent, creation_time, last_attempt_time
            FROM event_log
            WHERE state = 'not_published'
            ORDER BY creation_time, event_id
            LIMIT $1
            "#,
        )
        .bind(limit_column(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn retrieve_republish_candidates(
        &self,
        limit: usize,
        max_auto_attempts: u32,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT e.event_id, e.event_type_name, e.entity_id, e.content, e.state,
                   e.times_sent, e.creation_time, e.last_attempt_time
            FROM event_log e
            LEFT JOIN failed_message_chains c
                ON c.entity_id = COALESCE(e.entity_id, e.event_id::text)
            WHERE e.state = 'published_failed'
              AND NOT EXISTS (
                  SELECT 1 FROM failed_messages m
                  WHERE m.event_id = e.event_id AND m.should_skip
              )
              AND (COALESCE(c.should_republish, FALSE) OR e.times_sent < $2)
            ORDER BY e.creation_time, e.event_id
            LIMIT $1
            "#,
        )
        .bind(limit_column(limit))
        .bind(times_sent_column(max_auto_attempts))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn retrieve_stale_in_progress(
        &self,
        older_than: Timestamp,
        limit: usize,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type_name, entity_id, content, state,
                   times_sent, creation_time, last_attempt_time
            FROM event_log
            WHERE state = 'in_progress'
              AND COALESCE(last_attempt_time, creation_time) < $1
            ORDER BY creation_time, event_id
            LIMIT $2
            "#,
        )
        .bind(older_than.as_datetime())
        .bind(limit_column(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn mark_in_progress(&self, event_id: EventId) -> Result<EventLogEntry, DomainError> {
        self.transition(event_id, EventLogEntry::mark_in_progress)
            .await
    }

    async fn mark_published(&self, event_id: EventId) -> Result<EventLogEntry, DomainError> {
        self.transition(event_id, EventLogEntry::mark_published)
            .await
    }

    async fn mark_failed(&self, event_id: EventId) -> Result<EventLogEntry, DomainError> {
        self.transition(event_id, EventLogEntry::mark_failed).await
    }
}

impl PostgresStore {
    /// Locks the entry, applies `apply` and writes the bookkeeping columns back.
    ///
    /// A rejected transition drops the transaction, leaving the row untouched.
    async fn transition(
        &self,
        event_id: EventId,
        apply: fn(&mut EventLogEntry) -> Result<(), DomainError>,
    ) -> Result<EventLogEntry, DomainError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query(
            r#"
            SELECT event_id, event_type_name, entity_id, content, state,
                   times_sent, creation_time, last_attempt_time
            FROM event_log
            WHERE event_id = $1
            FOR UPDATE
            "#,
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut entry = match row {
            Some(row) => row_to_entry(&row)?,
            None => {
                return Err(DomainError::new(
                    ErrorCode::EventLogEntryNotFound,
                    format!("Event log entry {} not found", event_id),
                )
                .with_detail("event_id", event_id.to_string()))
            }
        };
        apply(&mut entry)?;

        sqlx::query(
            r#"
            UPDATE event_log SET
                state = $2,
                times_sent = $3,
                last_attempt_time = $4
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(entry.state().as_str())
        .bind(times_sent_column(entry.times_sent()))
        .bind(entry.last_attempt_time().map(|t| *t.as_datetime()))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(entry)
    }
}

fn row_to_entry(row: &PgRow) -> Result<EventLogEntry, DomainError> {
    let event_id: Uuid = row.try_get("event_id").map_err(map_sqlx_error)?;
    let event_type_name: String = row.try_get("event_type_name").map_err(map_sqlx_error)?;
    let entity_id: Option<String> = row.try_get("entity_id").map_err(map_sqlx_error)?;
    let content: String = row.try_get("content").map_err(map_sqlx_error)?;
    let state: &str = row.try_get("state").map_err(map_sqlx_error)?;
    let times_sent: i32 = row.try_get("times_sent").map_err(map_sqlx_error)?;
    let creation_time: DateTime<Utc> = row.try_get("creation_time").map_err(map_sqlx_error)?;
    let last_attempt_time: Option<DateTime<Utc>> =
        row.try_get("last_attempt_time").map_err(map_sqlx_error)?;

    Ok(EventLogEntry::reconstitute(
        EventId::from_uuid(event_id),
        event_type_name,
        entity_id.map(EntityId::new),
        content,
        EventState::from_str(state)?,
        u32::try_from(times_sent).unwrap_or(0),
        Timestamp::from_datetime(creation_time),
        last_attempt_time.map(Timestamp::from_datetime),
    ))
}

fn times_sent_column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn limit_column(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
