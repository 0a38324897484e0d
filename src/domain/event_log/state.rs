//! Delivery state machine for event log entries.

use crate::domain::foundation::{DomainError, ErrorCode, StateMachine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery state of an event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    /// Saved with its business change, never handed to the broker.
    #[default]
    NotPublished,

    /// Handed to the broker, outcome not yet recorded.
    InProgress,

    /// Broker accepted the event. Terminal.
    Published,

    /// Last delivery attempt failed. May be retried.
    PublishedFailed,
}

impl EventState {
    /// Storage representation, also used by the Postgres adapter.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::NotPublished => "not_published",
            EventState::InProgress => "in_progress",
            EventState::Published => "published",
            EventState::PublishedFailed => "published_failed",
        }
    }
}

impl StateMachine for EventState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use EventState::*;
        matches!(
            (self, target),
            (NotPublished, InProgress)
                | (InProgress, Published)
                | (InProgress, PublishedFailed)
                // Retry
                | (PublishedFailed, InProgress)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use EventState::*;
        match self {
            NotPublished => vec![InProgress],
            InProgress => vec![Published, PublishedFailed],
            Published => vec![],
            PublishedFailed => vec![InProgress],
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_published" => Ok(EventState::NotPublished),
            "in_progress" => Ok(EventState::InProgress),
            "published" => Ok(EventState::Published),
            "published_failed" => Ok(EventState::PublishedFailed),
            other => Err(DomainError::new(
                ErrorCode::DeserializationFailed,
                format!("Unknown event state '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EventState; 4] = [
        EventState::NotPublished,
        EventState::InProgress,
        EventState::Published,
        EventState::PublishedFailed,
    ];

    #[test]
    fn default_is_not_published() {
        assert_eq!(EventState::default(), EventState::NotPublished);
    }

    #[test]
    fn delivery_path_is_allowed() {
        assert!(EventState::NotPublished.can_transition_to(&EventState::InProgress));
        assert!(EventState::InProgress.can_transition_to(&EventState::Published));
        assert!(EventState::InProgress.can_transition_to(&EventState::PublishedFailed));
        assert!(EventState::PublishedFailed.can_transition_to(&EventState::InProgress));
    }

    #[test]
    fn published_is_terminal() {
        assert!(EventState::Published.is_terminal());
        for target in ALL {
            assert!(EventState::Published.transition_to(target).is_err());
        }
    }

    #[test]
    fn no_state_regresses_except_retry() {
        assert!(!EventState::InProgress.can_transition_to(&EventState::NotPublished));
        assert!(!EventState::PublishedFailed.can_transition_to(&EventState::NotPublished));
        assert!(!EventState::PublishedFailed.can_transition_to(&EventState::Published));
        assert!(!EventState::NotPublished.can_transition_to(&EventState::Published));
        assert!(!EventState::NotPublished.can_transition_to(&EventState::PublishedFailed));
    }

    #[test]
    fn self_transitions_are_rejected() {
        for state in ALL {
            assert!(!state.can_transition_to(&state), "{:?} -> itself", state);
        }
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(&to),
                    from.valid_transitions().contains(&to),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn storage_names_round_trip() {
        for state in ALL {
            assert_eq!(state.as_str().parse::<EventState>().unwrap(), state);
        }
        assert!("sent".parse::<EventState>().is_err());
    }

    #[test]
    fn serializes_to_snake_case_json() {
        assert_eq!(
            serde_json::to_string(&EventState::PublishedFailed).unwrap(),
            "\"published_failed\""
        );
    }
}
