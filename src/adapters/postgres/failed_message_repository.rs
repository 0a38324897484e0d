//! PostgreSQL implementation of FailedMessageRepository.
//!
//! Chains are unique per entity id; `record_failure` upserts the chain and
//! appends the message in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::failed_messages::{FailedMessage, FailedMessageChain, FailureRecord};
use crate::domain::foundation::{
    DomainError, EntityId, ErrorCode, EventId, FailedMessageChainId, FailedMessageId, Timestamp,
};
use crate::ports::FailedMessageRepository;

use super::errors::map_sqlx_error;
use super::store::PostgresStore;

#[async_trait]
impl FailedMessageRepository for PostgresStore {
    async fn record_failure(&self, record: FailureRecord) -> Result<FailedMessage, DomainError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        // The no-op update makes RETURNING yield the existing chain's id
        let chain_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO failed_message_chains (creation_time, entity_id, should_republish)
            VALUES ($1, $2, FALSE)
            ON CONFLICT (entity_id) DO UPDATE SET entity_id = EXCLUDED.entity_id
            RETURNING id
            "#,
        )
        .bind(record.creation_time.as_datetime())
        .bind(record.entity_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let message_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO failed_messages (
                chain_id, event_id, creation_time, body, message, stack_trace, should_skip
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(chain_id)
        .bind(record.event_id.as_uuid())
        .bind(record.creation_time.as_datetime())
        .bind(&record.body)
        .bind(record.message.as_deref())
        .bind(record.stack_trace.as_deref())
        .bind(record.should_skip)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(FailedMessage::from_record(
            FailedMessageId::new(message_id),
            FailedMessageChainId::new(chain_id),
            record,
        ))
    }

    async fn find_chain(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<FailedMessageChain>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, creation_time, entity_id, should_republish
            FROM failed_message_chains
            WHERE entity_id = $1
            "#,
        )
        .bind(entity_id.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_chain).transpose()
    }

    async fn list_chains(&self, limit: usize) -> Result<Vec<FailedMessageChain>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, creation_time, entity_id, should_republish
            FROM failed_message_chains
            ORDER BY creation_time, id
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_chain).collect()
    }

    async fn list_messages(
        &self,
        chain_id: FailedMessageChainId,
    ) -> Result<Vec<FailedMessage>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, chain_id, event_id, creation_time, body, message, stack_trace, should_skip
            FROM failed_messages
            WHERE chain_id = $1
            ORDER BY creation_time, id
            "#,
        )
        .bind(chain_id.value())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_message).collect()
    }

    async fn set_should_republish(
        &self,
        chain_id: FailedMessageChainId,
        value: bool,
    ) -> Result<FailedMessageChain, DomainError> {
        let row = sqlx::query(
            r#"
            UPDATE failed_message_chains SET should_republish = $2
            WHERE id = $1
            RETURNING id, creation_time, entity_id, should_republish
            "#,
        )
        .bind(chain_id.value())
        .bind(value)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row_to_chain(&row),
            None => Err(DomainError::new(
                ErrorCode::FailedMessageChainNotFound,
                format!("Failed message chain {} not found", chain_id.value()),
            )),
        }
    }

    async fn set_should_skip(
        &self,
        message_id: FailedMessageId,
        value: bool,
    ) -> Result<FailedMessage, DomainError> {
        let row = sqlx::query(
            r#"
            UPDATE failed_messages SET should_skip = $2
            WHERE id = $1
            RETURNING id, chain_id, event_id, creation_time, body, message, stack_trace, should_skip
            "#,
        )
        .bind(message_id.value())
        .bind(value)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row_to_message(&row),
            None => Err(DomainError::new(
                ErrorCode::FailedMessageNotFound,
                format!("Failed message {} not found", message_id.value()),
            )),
        }
    }
}

fn row_to_chain(row: &PgRow) -> Result<FailedMessageChain, DomainError> {
    let id: i64 = row.try_get("id").map_err(map_sqlx_error)?;
    let creation_time: DateTime<Utc> = row.try_get("creation_time").map_err(map_sqlx_error)?;
    let entity_id: String = row.try_get("entity_id").map_err(map_sqlx_error)?;
    let should_republish: bool = row.try_get("should_republish").map_err(map_sqlx_error)?;

    Ok(FailedMessageChain::reconstitute(
        FailedMessageChainId::new(id),
        Timestamp::from_datetime(creation_time),
        EntityId::new(entity_id),
        should_republish,
    ))
}

fn row_to_message(row: &PgRow) -> Result<FailedMessage, DomainError> {
    let id: i64 = row.try_get("id").map_err(map_sqlx_error)?;
    let chain_id: i64 = row.try_get("chain_id").map_err(map_sqlx_error)?;
    let event_id: Uuid = row.try_get("event_id").map_err(map_sqlx_error)?;
    let creation_time: DateTime<Utc> = row.try_get("creation_time").map_err(map_sqlx_error)?;
    let body: String = row.try_get("body").map_err(map_sqlx_error)?;
    let message: Option<String> = row.try_get("message").map_err(map_sqlx_error)?;
    let stack_trace: Option<String> = row.try_get("stack_trace").map_err(map_sqlx_error)?;
    let should_skip: bool = row.try_get("should_skip").map_err(map_sqlx_error)?;

    Ok(FailedMessage::reconstitute(
        FailedMessageId::new(id),
        FailedMessageChainId::new(chain_id),
        EventId::from_uuid(event_id),
        Timestamp::from_datetime(creation_time),
        body,
        message,
        stack_trace,
        should_skip,
    ))
}
