//! PostgresStore - Connection pool and transaction management.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::TransactionManager;

use super::errors::map_sqlx_error;

/// Transaction handle passed through the unit of work.
pub type PgTx = Transaction<'static, Postgres>;

/// PostgreSQL implementation of the store ports.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgresStore over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool as configured and applies migrations when enabled.
    ///
    /// # Errors
    ///
    /// - `TransientStoreFault` if the database cannot be reached
    /// - `DatabaseError` if a migration fails
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DomainError> {
        let pool = config
            .pool_options()
            .connect(&config.url)
            .await
            .map_err(map_sqlx_error)?;

        if config.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Migration failed: {}", e))
                })?;
            info!("Outbox migrations applied");
        }

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionManager for PostgresStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, DomainError> {
        self.pool.begin().await.map_err(map_sqlx_error)
    }

    async fn commit(&self, tx: PgTx) -> Result<(), DomainError> {
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(&self, tx: PgTx) -> Result<(), DomainError> {
        tx.rollback().await.map_err(map_sqlx_error)
    }
}
