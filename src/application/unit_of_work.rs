//! UnitOfWork - Runs store work inside one transaction with retry.
//!
//! Begins a transaction, runs the work against it, then commits on success
//! or rolls back on failure. Transient store faults re-run the work from
//! scratch on a fresh transaction with exponential backoff.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::domain::foundation::DomainError;
use crate::ports::TransactionManager;

/// Work executed inside a unit of work.
///
/// `run` may be invoked more than once when a transient fault forces a
/// retry, so it must not keep state from a rolled-back attempt.
#[async_trait]
pub trait Work<Tx: Send>: Send {
    type Output: Send;

    async fn run(&mut self, tx: &mut Tx) -> Result<Self::Output, DomainError>;
}

/// Retry strategy for transient store faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Executes `Work` atomically against a `TransactionManager`.
pub struct UnitOfWork<M: TransactionManager> {
    manager: Arc<M>,
    policy: RetryPolicy,
}

impl<M: TransactionManager> UnitOfWork<M> {
    pub fn new(manager: Arc<M>) -> Self {
        Self {
            manager,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn manager(&self) -> &Arc<M> {
        &self.manager
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `work` in a transaction, retrying transient faults.
    ///
    /// # Errors
    ///
    /// Returns the work's or the store's error once it is non-transient or
    /// the retry budget is spent. Nothing the work wrote is committed then.
    pub async fn execute<W>(&self, work: &mut W) -> Result<W::Output, DomainError>
    where
        W: Work<M::Tx>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.run_once(work).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store fault, retrying unit of work"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_once<W>(&self, work: &mut W) -> Result<W::Output, DomainError>
    where
        W: Work<M::Tx>,
    {
        let mut tx = self.manager.begin().await?;

        match work.run(&mut tx).await {
            Ok(output) => {
                self.manager.commit(tx).await.map_err(|err| {
                    error!(error = %err, code = %err.code, "Unit of work commit failed");
                    err
                })?;
                Ok(output)
            }
            Err(err) => {
                error!(error = %err, code = %err.code, "Unit of work failed, rolling back");
                if let Err(rollback_err) = self.manager.rollback(tx).await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}
