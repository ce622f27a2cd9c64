//! User application service.
//!
//! Every mutation runs inside [`TransactionManager::with_transaction`]. The event
//! describing it is built from the committed result and published only after the
//! transaction returned `Ok`:
//!
//! ```text
//! validate ──► with_transaction(mutate) ──► commit ──► publish ──► Ok(user)
//!                                      └──► rollback ──► Err (nothing published)
//! ```
//!
//! If publishing fails the mutation stays committed and the caller gets
//! [`UserError::Publish`].

use crate::diff::user_changes;
use crate::events::{UserCreated, UserDeleted, UserEvent, UserUpdated};
use crate::model::{NewUser, User, UserPage, UserUpdate};
use crate::store::UserTx;
use crate::validation::{validate_create, validate_update};
use courier_core::environment::{Clock, SystemClock};
use courier_core::event::Event;
use courier_core::publish::{PublishError, Publisher};
use courier_core::transaction::{TransactionError, TransactionManager};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by [`UserService`].
#[derive(Error, Debug)]
pub enum UserError {
    /// The request failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another user already has this email.
    #[error("User already exists: {0}")]
    AlreadyExists(String),

    /// No user with this id.
    #[error("User not found: {0}")]
    NotFound(String),

    /// The change committed but its event could not be published.
    #[error("Failed to publish event: {0}")]
    Publish(#[source] PublishError),

    /// The storage transaction failed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Creates, reads, updates and deletes users, publishing a [`UserEvent`] for every
/// committed change.
pub struct UserService<M, P> {
    store: M,
    publisher: P,
    clock: Arc<dyn Clock>,
}

impl<M, P> UserService<M, P>
where
    M: TransactionManager<Tx = UserTx>,
    P: Publisher<UserEvent>,
{
    /// Create a service timestamping events with the system clock.
    #[must_use]
    pub fn new(store: M, publisher: P) -> Self {
        Self::with_clock(store, publisher, Arc::new(SystemClock))
    }

    /// Create a service timestamping events with `clock`.
    #[must_use]
    pub fn with_clock(store: M, publisher: P, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            publisher,
            clock,
        }
    }

    /// Create a user and publish `user.created`.
    ///
    /// # Errors
    ///
    /// - [`UserError::InvalidInput`] if the input fails validation
    /// - [`UserError::AlreadyExists`] if the email is taken
    /// - [`UserError::Transaction`] if the transaction fails
    /// - [`UserError::Publish`] if the user was stored but the event was not published
    #[tracing::instrument(skip(self, new_user), fields(email = %new_user.email))]
    pub async fn create_user(&self, new_user: NewUser) -> Result<User, UserError> {
        validate_create(&new_user)?;

        let user = self
            .store
            .with_transaction(move |tx: &mut UserTx| {
                Box::pin(async move {
                    if tx.find_by_email(&new_user.email).is_some() {
                        return Err(UserError::AlreadyExists(new_user.email));
                    }
                    Ok(tx.insert(new_user))
                })
            })
            .await?;

        let event = UserCreated::new(&user.id, &user.email, self.clock.as_ref());
        self.publish(event.into()).await?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Look up a user.
    ///
    /// # Errors
    ///
    /// - [`UserError::NotFound`] if no user has this id
    /// - [`UserError::Transaction`] if the transaction fails
    pub async fn get_user(&self, id: &str) -> Result<User, UserError> {
        let id = id.to_string();
        self.store
            .with_transaction(move |tx: &mut UserTx| {
                Box::pin(async move { tx.find_by_id(&id).ok_or(UserError::NotFound(id)) })
            })
            .await
    }

    /// Page through users, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::Transaction`] if the transaction fails.
    pub async fn list_users(&self, limit: usize, offset: usize) -> Result<UserPage, UserError> {
        self.store
            .with_transaction(move |tx: &mut UserTx| {
                Box::pin(async move {
                    Ok(UserPage {
                        users: tx.list(limit, offset),
                        total: tx.count(),
                    })
                })
            })
            .await
    }

    /// Apply a partial update and publish `user.updated` with the changed fields.
    ///
    /// An update that changes nothing returns the stored user and publishes nothing.
    ///
    /// # Errors
    ///
    /// - [`UserError::InvalidInput`] if the update fails validation
    /// - [`UserError::NotFound`] if no user has this id
    /// - [`UserError::AlreadyExists`] if the new email belongs to another user
    /// - [`UserError::Transaction`] if the transaction fails
    /// - [`UserError::Publish`] if the update was stored but the event was not published
    #[tracing::instrument(skip(self, update))]
    pub async fn patch_user(&self, id: &str, update: UserUpdate) -> Result<User, UserError> {
        validate_update(&update)?;

        let id = id.to_string();
        let (user, changes) = self
            .store
            .with_transaction(move |tx: &mut UserTx| {
                Box::pin(async move {
                    let existing = tx
                        .find_by_id(&id)
                        .ok_or_else(|| UserError::NotFound(id.clone()))?;

                    let changes = user_changes(&update, &existing);
                    if changes.is_empty() {
                        return Ok((existing, changes));
                    }

                    if let Some(email) = changes.get("email").and(update.email.as_ref()) {
                        if tx.find_by_email(email).is_some() {
                            return Err(UserError::AlreadyExists(email.clone()));
                        }
                    }

                    let updated = tx
                        .update(&id, &update)
                        .ok_or_else(|| UserError::NotFound(id.clone()))?;
                    Ok((updated, changes))
                })
            })
            .await?;

        if changes.is_empty() {
            tracing::debug!(user_id = %user.id, "Update changed nothing, no event published");
            return Ok(user);
        }

        let fields = changes.len();
        let event = UserUpdated::new(&user.id, changes, self.clock.as_ref());
        self.publish(event.into()).await?;

        tracing::info!(user_id = %user.id, fields, "User updated");
        Ok(user)
    }

    /// Delete a user and publish `user.deleted`.
    ///
    /// # Errors
    ///
    /// - [`UserError::NotFound`] if no user has this id
    /// - [`UserError::Transaction`] if the transaction fails
    /// - [`UserError::Publish`] if the user was deleted but the event was not published
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, id: &str) -> Result<(), UserError> {
        let id = id.to_string();
        let user = self
            .store
            .with_transaction(move |tx: &mut UserTx| {
                Box::pin(async move { tx.delete(&id).ok_or(UserError::NotFound(id)) })
            })
            .await?;

        let event = UserDeleted::new(&user.id, self.clock.as_ref());
        self.publish(event.into()).await?;

        tracing::info!(user_id = %user.id, "User deleted");
        Ok(())
    }

    async fn publish(&self, event: UserEvent) -> Result<(), UserError> {
        self.publisher.publish(&event).await.map_err(|err| {
            tracing::error!(
                event_id = event.event_id(),
                event_type = event.event_type(),
                error = %err,
                "Change committed but its event was not published"
            );
            UserError::Publish(err)
        })
    }
}
