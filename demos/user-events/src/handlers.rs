//! Worker-side handlers, one per user event type.
//!
//! They only log. A real application would update a read model, send a welcome mail
//! and so on; whatever it does must tolerate redelivery of the same event.

use crate::events::{UserCreated, UserDeleted, UserUpdated};
use courier_core::event::Event;
use courier_core::handler::Handler;
use futures::future::BoxFuture;

/// Handles `user.created`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserCreatedHandler;

impl Handler<UserCreated> for UserCreatedHandler {
    fn handle(&self, event: UserCreated) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            tracing::info!(
                event_id = event.event_id(),
                user_id = %event.user_id,
                email = %event.email,
                "User created"
            );
            Ok(())
        })
    }
}

/// Handles `user.updated`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserUpdatedHandler;

impl Handler<UserUpdated> for UserUpdatedHandler {
    fn handle(&self, event: UserUpdated) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let fields: Vec<&str> = event.changes.iter().map(|(field, _)| field).collect();
            tracing::info!(
                event_id = event.event_id(),
                user_id = %event.user_id,
                fields = ?fields,
                "User updated"
            );
            Ok(())
        })
    }
}

/// Handles `user.deleted`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserDeletedHandler;

impl Handler<UserDeleted> for UserDeletedHandler {
    fn handle(&self, event: UserDeleted) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            tracing::info!(
                event_id = event.event_id(),
                user_id = %event.user_id,
                "User deleted"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::event::Changes;
    use courier_testing::{CapturedLogs, test_clock};
    use tracing::Level;

    #[tokio::test]
    async fn each_handler_logs_the_event_at_info() {
        let logs = CapturedLogs::new();
        let _guard = logs.set_default();
        let clock = test_clock();

        let created = UserCreated::new("user-1", "ada@example.com", &clock);
        let mut changes = Changes::new();
        changes.track("first_name", &"Ada".to_string(), Some(&"Augusta".to_string()));
        let updated = UserUpdated::new("user-1", changes, &clock);
        let deleted = UserDeleted::new("user-1", &clock);

        assert!(UserCreatedHandler.handle(created.clone()).await.is_ok());
        assert!(UserUpdatedHandler.handle(updated).await.is_ok());
        assert!(UserDeletedHandler.handle(deleted).await.is_ok());

        let messages: Vec<_> = logs
            .at_level(Level::INFO)
            .into_iter()
            .map(|event| event.message)
            .collect();
        assert_eq!(messages, ["User created", "User updated", "User deleted"]);

        let logged = logs.with_message("User created");
        assert_eq!(logged[0].field("event_id"), Some(created.event_id()));
        assert_eq!(logged[0].field("email"), Some("ada@example.com"));
    }
}
