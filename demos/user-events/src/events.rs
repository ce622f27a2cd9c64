//! User domain events.
//!
//! Every event embeds [`EventMetadata`] flattened, so the payload is one flat JSON
//! object:
//!
//! ```json
//! {
//!   "event_id": "5f0c…",
//!   "event_type": "user.created",
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "user_id": "8a41…",
//!   "email": "ada@example.com"
//! }
//! ```

use chrono::{DateTime, Utc};
use courier_core::codec::DecodeTable;
use courier_core::environment::Clock;
use courier_core::event::{Changes, Event, EventMetadata};
use serde::{Deserialize, Serialize};

/// Event type of [`UserCreated`].
pub const USER_CREATED: &str = "user.created";
/// Event type of [`UserUpdated`].
pub const USER_UPDATED: &str = "user.updated";
/// Event type of [`UserDeleted`].
pub const USER_DELETED: &str = "user.deleted";

/// A user was created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    /// Event envelope
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Id of the new user
    pub user_id: String,
    /// Email of the new user
    pub email: String,
}

impl UserCreated {
    /// Create the event, timestamped by `clock`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            metadata: EventMetadata::at(USER_CREATED, clock),
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

/// Some fields of a user changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserUpdated {
    /// Event envelope
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Id of the updated user
    pub user_id: String,
    /// Changed fields, keyed by field name
    pub changes: Changes,
}

impl UserUpdated {
    /// Create the event, timestamped by `clock`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, changes: Changes, clock: &dyn Clock) -> Self {
        Self {
            metadata: EventMetadata::at(USER_UPDATED, clock),
            user_id: user_id.into(),
            changes,
        }
    }
}

/// A user was deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    /// Event envelope
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Id of the deleted user
    pub user_id: String,
}

impl UserDeleted {
    /// Create the event, timestamped by `clock`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            metadata: EventMetadata::at(USER_DELETED, clock),
            user_id: user_id.into(),
        }
    }
}

macro_rules! user_event {
    ($event:ty) => {
        impl Event for $event {
            fn event_type(&self) -> &str {
                &self.metadata.event_type
            }

            fn event_id(&self) -> &str {
                &self.metadata.event_id
            }

            fn aggregate_id(&self) -> &str {
                &self.user_id
            }

            fn timestamp(&self) -> DateTime<Utc> {
                self.metadata.timestamp
            }
        }
    };
}

user_event!(UserCreated);
user_event!(UserUpdated);
user_event!(UserDeleted);

/// Any user event.
///
/// Serializes as the wrapped event (no variant tag), so a batch of mixed user events
/// goes through one publisher. Decode with [`user_event_table`], which dispatches on
/// `event_type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserEvent {
    /// `user.created`
    Created(UserCreated),
    /// `user.updated`
    Updated(UserUpdated),
    /// `user.deleted`
    Deleted(UserDeleted),
}

impl UserEvent {
    fn inner(&self) -> &dyn Event {
        match self {
            Self::Created(event) => event,
            Self::Updated(event) => event,
            Self::Deleted(event) => event,
        }
    }
}

impl Event for UserEvent {
    fn event_type(&self) -> &str {
        self.inner().event_type()
    }

    fn event_id(&self) -> &str {
        self.inner().event_id()
    }

    fn aggregate_id(&self) -> &str {
        self.inner().aggregate_id()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.inner().timestamp()
    }
}

impl From<UserCreated> for UserEvent {
    fn from(event: UserCreated) -> Self {
        Self::Created(event)
    }
}

impl From<UserUpdated> for UserEvent {
    fn from(event: UserUpdated) -> Self {
        Self::Updated(event)
    }
}

impl From<UserDeleted> for UserEvent {
    fn from(event: UserDeleted) -> Self {
        Self::Deleted(event)
    }
}

/// Decoder for every user event type.
#[must_use]
pub fn user_event_table() -> DecodeTable<UserEvent> {
    DecodeTable::new()
        .register(USER_CREATED, UserEvent::Created)
        .register(USER_UPDATED, UserEvent::Updated)
        .register(USER_DELETED, UserEvent::Deleted)
}
