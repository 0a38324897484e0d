//! Failure escalation records.
//!
//! Persistent delivery failures are grouped into one chain per entity so an
//! operator can inspect them and flag the chain for republishing or skip
//! individual messages.

mod chain;
mod message;

pub use chain::FailedMessageChain;
pub use message::{FailedMessage, FailureRecord};
