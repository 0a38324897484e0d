//! FailedMessageRepository port - Failure escalation store.
//!
//! Written by the publisher loop when a delivery fails and by operators
//! resolving those failures. Never part of a business transaction.

use async_trait::async_trait;

use crate::domain::failed_messages::{FailedMessage, FailedMessageChain, FailureRecord};
use crate::domain::foundation::{DomainError, EntityId, FailedMessageChainId, FailedMessageId};

/// Port for recording and resolving delivery failures.
#[async_trait]
pub trait FailedMessageRepository: Send + Sync {
    /// Append a failure to its entity's chain, creating the chain if absent.
    ///
    /// An existing chain keeps its `should_republish` flag.
    async fn record_failure(&self, record: FailureRecord) -> Result<FailedMessage, DomainError>;

    /// Find the chain for an entity.
    async fn find_chain(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<FailedMessageChain>, DomainError>;

    /// Up to `limit` chains, oldest first.
    async fn list_chains(&self, limit: usize) -> Result<Vec<FailedMessageChain>, DomainError>;

    /// All messages of a chain, oldest first.
    async fn list_messages(
        &self,
        chain_id: FailedMessageChainId,
    ) -> Result<Vec<FailedMessage>, DomainError>;

    /// Operator action: allow or stop republishing of the chain's events.
    ///
    /// # Errors
    ///
    /// - `FailedMessageChainNotFound` if the chain does not exist
    async fn set_should_republish(
        &self,
        chain_id: FailedMessageChainId,
        value: bool,
    ) -> Result<FailedMessageChain, DomainError>;

    /// Operator action: exclude the message's event from republishing.
    ///
    /// # Errors
    ///
    /// - `FailedMessageNotFound` if the message does not exist
    async fn set_should_skip(
        &self,
        message_id: FailedMessageId,
        value: bool,
    ) -> Result<FailedMessage, DomainError>;
}
