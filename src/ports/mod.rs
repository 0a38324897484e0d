//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the outbox core and the outside world. Adapters implement these ports.
//!
//! ## Store Ports
//!
//! - `TransactionManager` - Begins, commits and rolls back store transactions
//! - `EventLogRepository` - Transactional event log (the outbox table)
//! - `FailedMessageRepository` - Failure escalation chains
//! - `EntityRepository` - Caller-supplied business rows saved with their events
//!
//! ## Broker Ports
//!
//! - `EventPublisher` - Port for publishing events to the broker
//! - `EventSubscriber` - Port for subscribing to delivered events
//! - `EventHandler` - Handler that processes delivered events

mod entity_repository;
mod event_log_repository;
mod event_publisher;
mod event_subscriber;
mod failed_message_repository;
mod transaction_manager;

pub use entity_repository::EntityRepository;
pub use event_log_repository::EventLogRepository;
pub use event_publisher::EventPublisher;
pub use event_subscriber::{EventBus, EventHandler, EventSubscriber};
pub use failed_message_repository::FailedMessageRepository;
pub use transaction_manager::TransactionManager;
