//! Failed message chain entity.

use crate::domain::foundation::{EntityId, FailedMessageChainId, Timestamp};
use serde::{Deserialize, Serialize};

/// Groups every delivery failure recorded for one entity.
///
/// # Invariants
///
/// - at most one chain exists per `entity_id`
/// - `should_republish` is only changed by operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMessageChain {
    id: FailedMessageChainId,
    creation_time: Timestamp,
    entity_id: EntityId,
    should_republish: bool,
}

impl FailedMessageChain {
    /// Creates a chain for a newly failing entity.
    pub fn new(id: FailedMessageChainId, entity_id: EntityId) -> Self {
        Self {
            id,
            creation_time: Timestamp::now(),
            entity_id,
            should_republish: false,
        }
    }

    /// Reconstitute a chain from persistence.
    pub fn reconstitute(
        id: FailedMessageChainId,
        creation_time: Timestamp,
        entity_id: EntityId,
        should_republish: bool,
    ) -> Self {
        Self {
            id,
            creation_time,
            entity_id,
            should_republish,
        }
    }

    pub fn id(&self) -> FailedMessageChainId {
        self.id
    }

    pub fn creation_time(&self) -> Timestamp {
        self.creation_time
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn should_republish(&self) -> bool {
        self.should_republish
    }

    pub fn set_should_republish(&mut self, value: bool) {
        self.should_republish = value;
    }
}
