//! PostgreSQL adapters.
//!
//! `PostgresStore` implements the store ports over one connection pool:
//!
//! - `TransactionManager` - `sqlx` transactions, rolled back when dropped
//! - `EventLogRepository` - The `event_log` table
//! - `FailedMessageRepository` - `failed_message_chains` and `failed_messages`
//!
//! Schema lives in `migrations/`.

mod errors;
mod event_log_repository;
mod failed_message_repository;
mod store;

pub use errors::map_sqlx_error;
pub use store::{PgTx, PostgresStore};
