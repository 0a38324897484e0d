//! Event log - the outbox table's entity and its delivery state machine.

mod entry;
mod state;

pub use entry::EventLogEntry;
pub use state::EventState;
