//! TransactionManager port - Explicit transaction acquisition and release.
//!
//! The unit of work begins a transaction, hands the handle to repository
//! calls, then commits or rolls back. Adapters must roll back a handle that
//! is dropped without either call, so a cancelled unit of work never leaves
//! partial writes behind.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

/// Port for beginning and finishing store transactions.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Transaction handle passed to repository calls.
    ///
    /// Dropping the handle without `commit` must discard its writes.
    type Tx: Send + 'static;

    /// Begin a new transaction on its own connection.
    async fn begin(&self) -> Result<Self::Tx, DomainError>;

    /// Commit all writes made through the handle.
    ///
    /// Faults that a fresh attempt may survive are reported as
    /// `TransientStoreFault`.
    async fn commit(&self, tx: Self::Tx) -> Result<(), DomainError>;

    /// Discard all writes made through the handle.
    async fn rollback(&self, tx: Self::Tx) -> Result<(), DomainError>;
}
