//! Application layer - Unit of work, event log and event service.
//!
//! This layer orchestrates the outbox operations and coordinates between ports.

mod event_log;
mod event_service;
mod unit_of_work;

pub use event_log::EventLog;
pub use event_service::{DecodedBatch, EventService, RejectedEntry};
pub use unit_of_work::{RetryPolicy, UnitOfWork, Work};
