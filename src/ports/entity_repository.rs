//! EntityRepository port - Business rows written alongside their events.
//!
//! The outbox does not own business entities. Callers supply a repository
//! that persists them through the same transaction handle as the event log.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EntityId};

/// Port for persisting the business entity an event describes.
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl EntityRepository<PgTx, Order> for PostgresOrders {
///     async fn insert(&self, tx: &mut PgTx, order: &mut Order) -> Result<EntityId, DomainError> {
///         let id: i64 = sqlx::query_scalar("INSERT INTO orders (..) VALUES (..) RETURNING id")
///             .fetch_one(&mut **tx)
///             .await
///             .map_err(map_sqlx_error)?;
///         order.id = id;
///         Ok(EntityId::from(id))
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait EntityRepository<Tx: Send, E: Send + Sync>: Send + Sync {
    /// Insert a new entity, returning its (possibly store-generated) key.
    async fn insert(&self, tx: &mut Tx, entity: &mut E) -> Result<EntityId, DomainError>;

    /// Update an existing entity, returning its key.
    async fn update(&self, tx: &mut Tx, entity: &E) -> Result<EntityId, DomainError>;
}
