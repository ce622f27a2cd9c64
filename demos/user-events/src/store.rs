//! In-memory user storage with transactions.
//!
//! A transaction takes the store's lock for its whole lifetime and works on a copy of
//! the users. Commit swaps the copy in; rollback drops it. Transactions are therefore
//! serialized, which is all the isolation this store offers.

use crate::model::{NewUser, User, UserUpdate};
use courier_core::environment::{Clock, SystemClock};
use courier_core::transaction::{TransactionError, TransactionManager};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// In-memory [`TransactionManager`] over a list of users.
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct InMemoryUserStore {
    users: Arc<Mutex<Vec<User>>>,
    clock: Arc<dyn Clock>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryUserStore {
    /// Create an empty store timestamping with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store timestamping with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: Arc::new(Mutex::new(Vec::new())),
            clock,
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make the next commit fail with [`TransactionError::Commit`].
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the committed users, oldest first.
    pub async fn users(&self) -> Vec<User> {
        self.users.lock().await.clone()
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction-scoped view of an [`InMemoryUserStore`].
pub struct UserTx {
    committed: OwnedMutexGuard<Vec<User>>,
    working: Vec<User>,
    clock: Arc<dyn Clock>,
}

impl UserTx {
    /// Find a user by id.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<User> {
        self.working.iter().find(|user| user.id == id).cloned()
    }

    /// Find a user by email.
    #[must_use]
    pub fn find_by_email(&self, email: &str) -> Option<User> {
        self.working.iter().find(|user| user.email == email).cloned()
    }

    /// Store a new user under a fresh id.
    pub fn insert(&mut self, new_user: NewUser) -> User {
        let now = self.clock.now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            created_at: now,
            updated_at: now,
        };
        self.working.push(user.clone());
        user
    }

    /// Apply `update` to the user with `id`, returning the updated user.
    ///
    /// Returns `None` if no such user exists.
    pub fn update(&mut self, id: &str, update: &UserUpdate) -> Option<User> {
        let now = self.clock.now();
        let user = self.working.iter_mut().find(|user| user.id == id)?;
        update.apply_to(user);
        user.updated_at = now;
        Some(user.clone())
    }

    /// Remove the user with `id`, returning it.
    ///
    /// Returns `None` if no such user exists.
    pub fn delete(&mut self, id: &str) -> Option<User> {
        let index = self.working.iter().position(|user| user.id == id)?;
        Some(self.working.remove(index))
    }

    /// Up to `limit` users after skipping `offset`, oldest first.
    #[must_use]
    pub fn list(&self, limit: usize, offset: usize) -> Vec<User> {
        self.working.iter().skip(offset).take(limit).cloned().collect()
    }

    /// Number of users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.working.len()
    }
}

impl TransactionManager for InMemoryUserStore {
    type Tx = UserTx;

    fn begin(&self) -> BoxFuture<'_, Result<UserTx, TransactionError>> {
        Box::pin(async move {
            let committed = Arc::clone(&self.users).lock_owned().await;
            let working = committed.clone();
            Ok(UserTx {
                committed,
                working,
                clock: Arc::clone(&self.clock),
            })
        })
    }

    fn commit(&self, tx: UserTx) -> BoxFuture<'_, Result<(), TransactionError>> {
        Box::pin(async move {
            if self.fail_next_commit.swap(false, Ordering::SeqCst) {
                return Err(TransactionError::Commit("commit rejected".to_string()));
            }

            let UserTx {
                mut committed,
                working,
                ..
            } = tx;
            *committed = working;
            Ok(())
        })
    }

    fn rollback(&self, tx: UserTx) -> BoxFuture<'_, Result<(), TransactionError>> {
        drop(tx);
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: a failing test
mod tests {
    use super::*;
    use courier_testing::test_clock;

    #[derive(Debug)]
    struct Rejected;

    impl std::fmt::Display for Rejected {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("rejected")
        }
    }

    impl From<TransactionError> for Rejected {
        fn from(_: TransactionError) -> Self {
            Self
        }
    }

    fn store() -> InMemoryUserStore {
        InMemoryUserStore::with_clock(Arc::new(test_clock()))
    }

    fn ada() -> NewUser {
        NewUser::new("ada@example.com", "Ada", "Lovelace")
    }

    #[tokio::test]
    async fn committed_insert_is_visible() {
        let store = store();

        let user = store
            .with_transaction(|tx: &mut UserTx| {
                Box::pin(async move { Ok::<_, Rejected>(tx.insert(ada())) })
            })
            .await
            .unwrap();

        assert_eq!(store.users().await, vec![user.clone()]);
        assert_eq!(user.created_at, test_clock().now());
        assert_eq!(user.created_at, user.updated_at);
    }

    #[tokio::test]
    async fn rolled_back_insert_is_discarded() {
        let store = store();

        let result: Result<(), Rejected> = store
            .with_transaction(|tx: &mut UserTx| {
                Box::pin(async move {
                    tx.insert(ada());
                    Err(Rejected)
                })
            })
            .await;

        assert!(result.is_err());
        assert!(store.users().await.is_empty());
    }

    #[tokio::test]
    async fn failed_commit_is_discarded_once() {
        let store = store();
        store.fail_next_commit();

        let first: Result<User, Rejected> = store
            .with_transaction(|tx: &mut UserTx| Box::pin(async move { Ok(tx.insert(ada())) }))
            .await;
        let second: Result<User, Rejected> = store
            .with_transaction(|tx: &mut UserTx| Box::pin(async move { Ok(tx.insert(ada())) }))
            .await;

        assert!(first.is_err());
        assert!(second.is_ok());
        assert_eq!(store.users().await.len(), 1);
    }

    #[tokio::test]
    async fn transaction_sees_its_own_writes() {
        let store = store();

        let (found, count) = store
            .with_transaction(|tx: &mut UserTx| {
                Box::pin(async move {
                    let user = tx.insert(ada());
                    let updated = tx.update(&user.id, &UserUpdate::default().last_name("King"));
                    Ok::<_, Rejected>((updated, tx.count()))
                })
            })
            .await
            .unwrap();

        assert_eq!(found.map(|user| user.last_name), Some("King".to_string()));
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn lookups_and_paging() {
        let store = store();

        let page = store
            .with_transaction(|tx: &mut UserTx| {
                Box::pin(async move {
                    for n in 0..5 {
                        tx.insert(NewUser::new(format!("user{n}@example.com"), "A", "B"));
                    }
                    assert!(tx.find_by_email("user3@example.com").is_some());
                    assert!(tx.find_by_email("nobody@example.com").is_none());
                    assert!(tx.delete("missing").is_none());
                    assert!(tx.update("missing", &UserUpdate::default()).is_none());
                    Ok::<_, Rejected>(tx.list(2, 1))
                })
            })
            .await
            .unwrap();

        let emails: Vec<_> = page.into_iter().map(|user| user.email).collect();
        assert_eq!(emails, ["user1@example.com", "user2@example.com"]);
    }
}
