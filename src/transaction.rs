//! Saga-style transaction manager with compensating rollbacks

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, error, info, warn};

type RollbackFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type Rollback = Box<dyn FnOnce() -> RollbackFuture + Send>;

/// Runs a sequence of steps, remembering a compensation for each one that
/// succeeded.
///
/// When a step fails, every registered compensation runs in reverse
/// registration order and the step's own error is returned. Compensation
/// failures are logged and never replace that error.
///
/// ```rust,ignore
/// let mut tx = TransactionManager::new("create_event_group");
/// let group = tx
///     .execute_with_rollback(|| store.create_group(&event), {
///         let store = store.clone();
///         move || async move { store.delete_group(group_id).await }
///     })
///     .await?;
/// tx.execute(|| whatsapp.notify_members(&group)).await?;
/// tx.commit();
/// ```
pub struct TransactionManager {
    name: Box<str>,
    rollbacks: Vec<Rollback>,
}

impl TransactionManager {
    /// Empty transaction; `name` tags its log lines
    pub fn new(name: impl Into<Box<str>>) -> Self {
        Self {
            name: name.into(),
            rollbacks: Vec::new(),
        }
    }

    /// Name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a step with no compensation of its own
    pub async fn execute<T, E, F, Fut>(&mut self, operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match operation().await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Run a step and, if it succeeds, register `rollback` as its compensation.
    /// The rollback is not run now.
    pub async fn execute_with_rollback<T, E, F, Fut, R, RFut>(
        &mut self,
        operation: F,
        rollback: R,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnOnce() -> RFut + Send + 'static,
        RFut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        match operation().await {
            Ok(value) => {
                self.add_rollback(rollback);
                Ok(value)
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Register a compensation without running a step
    pub fn add_rollback<R, RFut>(&mut self, rollback: R)
    where
        R: FnOnce() -> RFut + Send + 'static,
        RFut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.rollbacks.push(Box::new(move || {
            let fut: RollbackFuture = Box::pin(rollback());
            fut
        }));
        debug!(transaction = %self.name, pending = self.rollbacks.len(), "Rollback registered");
    }

    /// Run and clear every registered compensation, newest first.
    ///
    /// Returns how many compensations failed.
    pub async fn rollback(&mut self) -> usize {
        let rollbacks = std::mem::take(&mut self.rollbacks);
        if rollbacks.is_empty() {
            return 0;
        }

        info!(transaction = %self.name, count = rollbacks.len(), "Rolling back transaction");

        let mut failures = 0;
        for (index, rollback) in rollbacks.into_iter().enumerate().rev() {
            match rollback().await {
                Ok(()) => debug!(transaction = %self.name, step = index, "Rollback step completed"),
                Err(e) => {
                    failures += 1;
                    error!(transaction = %self.name, step = index, error = %e, "Rollback step failed");
                }
            }
        }
        failures
    }

    /// Forget every registered compensation without running it
    pub fn commit(&mut self) {
        let dropped = self.rollbacks.len();
        self.rollbacks.clear();
        debug!(transaction = %self.name, dropped, "Transaction committed");
    }

    /// Compensations that a failure would run
    pub fn pending_rollbacks(&self) -> usize {
        self.rollbacks.len()
    }

    async fn fail<E: Display>(&mut self, e: E) -> E {
        warn!(transaction = %self.name, error = %e, "Transaction step failed");
        self.rollback().await;
        e
    }
}
