//! Storage transaction boundary for publish-on-commit.
//!
//! Application services mutate storage inside [`TransactionManager::with_transaction`]
//! and publish the resulting event only once it has returned `Ok`:
//!
//! ```text
//! with_transaction(|tx| mutate(tx)) ──► commit ──► publish(event)
//!                                  └──► rollback ──► return error (nothing published)
//! ```
//!
//! The transaction handle is passed to the closure explicitly as `&mut Self::Tx`.
//! Every storage call inside the closure goes through that handle, so there is no
//! ambient "current transaction" to look up.
//!
//! A crash between commit and publish loses the notification. That gap is accepted:
//! the pattern gives commit-then-notify ordering without a durable outbox.

use futures::future::BoxFuture;
use thiserror::Error;

/// Failures of the transaction machinery itself (as opposed to the work inside it).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The transaction could not be started
    #[error("Failed to begin transaction: {0}")]
    Begin(String),

    /// The transaction could not be committed
    #[error("Failed to commit transaction: {0}")]
    Commit(String),

    /// The transaction could not be rolled back
    #[error("Failed to roll back transaction: {0}")]
    Rollback(String),
}

/// Begins, commits and rolls back storage transactions.
///
/// Implementors provide the three primitives; callers use
/// [`with_transaction`](Self::with_transaction).
pub trait TransactionManager: Send + Sync {
    /// The transaction-scoped storage handle.
    type Tx: Send + 'static;

    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Begin`] if the transaction cannot be started.
    fn begin(&self) -> BoxFuture<'_, Result<Self::Tx, TransactionError>>;

    /// Commit a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Commit`] if the commit fails.
    fn commit(&self, tx: Self::Tx) -> BoxFuture<'_, Result<(), TransactionError>>;

    /// Roll back a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Rollback`] if the rollback fails.
    fn rollback(&self, tx: Self::Tx) -> BoxFuture<'_, Result<(), TransactionError>>;

    /// Run `f` inside a transaction.
    ///
    /// Commits if `f` returns `Ok` and returns its value. Otherwise rolls back and
    /// returns `f`'s error; a failing rollback is logged and does not replace it.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, or a [`TransactionError`] (converted into `E`) when the
    /// transaction cannot be started or committed.
    fn with_transaction<'a, T, E, F>(&'a self, f: F) -> BoxFuture<'a, Result<T, E>>
    where
        Self: Sized,
        T: Send + 'a,
        E: From<TransactionError> + std::fmt::Display + Send + 'a,
        F: for<'t> FnOnce(&'t mut Self::Tx) -> BoxFuture<'t, Result<T, E>> + Send + 'a,
    {
        Box::pin(async move {
            let mut tx = self.begin().await?;

            match f(&mut tx).await {
                Ok(value) => {
                    self.commit(tx).await?;
                    tracing::debug!("Transaction committed");
                    Ok(value)
                }
                Err(err) => {
                    tracing::debug!(error = %err, "Transaction rolled back");
                    if let Err(rollback_err) = self.rollback(tx).await {
                        tracing::error!(error = %rollback_err, "Rollback failed");
                    }
                    Err(err)
                }
            }
        })
    }
}
