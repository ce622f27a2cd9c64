//! Event trait and related types for the event pipeline.
//!
//! This module defines the shape every event must have before it can travel through
//! a [`Publisher`](crate::publish::Publisher) and come back out of a queue consumer.
//! Events represent facts about things that have happened and are immutable once
//! constructed.
//!
//! # Design
//!
//! The pipeline only ever touches four accessors: the event type, the event id, the
//! aggregate id and the creation timestamp. Everything else on a concrete event is
//! opaque payload. Concrete events embed [`EventMetadata`] with `#[serde(flatten)]`
//! so that the wire payload is a flat JSON object:
//!
//! ```json
//! {
//!   "event_id": "8d0a6c0e-5f0e-4c50-9a4e-0f2b1f7c9a11",
//!   "event_type": "user.created",
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "user_id": "user-123",
//!   "email": "test@example.com"
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use courier_core::event::{Event, EventMetadata};
//! use chrono::{DateTime, Utc};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct OrderPlaced {
//!     #[serde(flatten)]
//!     metadata: EventMetadata,
//!     order_id: String,
//! }
//!
//! impl Event for OrderPlaced {
//!     fn event_type(&self) -> &str {
//!         &self.metadata.event_type
//!     }
//!     fn event_id(&self) -> &str {
//!         &self.metadata.event_id
//!     }
//!     fn aggregate_id(&self) -> &str {
//!         &self.order_id
//!     }
//!     fn timestamp(&self) -> DateTime<Utc> {
//!         self.metadata.timestamp
//!     }
//! }
//!
//! let event = OrderPlaced {
//!     metadata: EventMetadata::new("order.placed"),
//!     order_id: "order-1".to_string(),
//! };
//! assert_eq!(event.event_type(), "order.placed");
//! assert_eq!(event.aggregate_id(), "order-1");
//! ```

use crate::environment::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Error types for event encoding and decoding.
///
/// The deserialization variants are what the consumer treats as a poison message:
/// logged, never acknowledged, never retried by the pipeline itself.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The payload decoded, but carries a different event type than the queue expects.
    #[error("Unexpected event type: expected '{expected}', found '{found}'")]
    UnexpectedEventType {
        /// The event type this deserializer is bound to
        expected: String,
        /// The event type found in the payload
        found: String,
    },
}

impl EventError {
    /// Whether this error came from decoding a payload (as opposed to encoding one).
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        !matches!(self, Self::SerializationError(_))
    }
}

/// A domain event that can travel through the pipeline.
///
/// # Invariants
///
/// - `event_id` is generated once at construction with UUID-grade entropy and never
///   changes. It doubles as the deduplication key at the backend.
/// - `aggregate_id` identifies the entity the event belongs to. Backends offering
///   per-group ordering (FIFO topics and queues) use it as the group key, so relative
///   order is preserved per aggregate only.
/// - `timestamp` is set once at construction, in UTC.
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` so they can be handed to handlers running
/// on the background consumer task.
pub trait Event: Send + Sync + 'static {
    /// Stable dot-namespaced type identifier, e.g. `"user.created"`.
    fn event_type(&self) -> &str;

    /// Globally unique identifier of this event instance.
    fn event_id(&self) -> &str;

    /// Identifier of the logical stream or entity this event belongs to.
    fn aggregate_id(&self) -> &str;

    /// Creation time of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Envelope fields shared by every concrete event.
///
/// Embed with `#[serde(flatten)]` to get the `event_id`, `event_type` and `timestamp`
/// keys at the top level of the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event id (UUID v4)
    pub event_id: String,
    /// Dot-namespaced event type
    pub event_type: String,
    /// Creation time, UTC
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    /// Create metadata with a fresh UUID v4 id and the current time.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_core::event::EventMetadata;
    ///
    /// let a = EventMetadata::new("user.created");
    /// let b = EventMetadata::new("user.created");
    /// assert_ne!(a.event_id, b.event_id);
    /// ```
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create metadata with a fresh id, taking the timestamp from `clock`.
    #[must_use]
    pub fn at(event_type: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            timestamp: clock.now(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.event_type, self.event_id)
    }
}

/// The `{old, new}` pair recorded for a single changed field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Value before the update
    pub old: serde_json::Value,
    /// Value after the update
    pub new: serde_json::Value,
}

/// Field name to [`FieldChange`] mapping carried by update-type events.
///
/// Only fields whose value actually changed are present. An empty map means the
/// update was a no-op and no event should be emitted for it.
///
/// Serializes as a plain JSON object: `{"email": {"old": "a@x.io", "new": "b@x.io"}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Changes(BTreeMap<String, FieldChange>);

impl Changes {
    /// Create an empty change set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Record a change for `field` if a new value was requested and it differs from
    /// the current one.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_core::event::Changes;
    ///
    /// let mut changes = Changes::new();
    /// changes.track("email", &"a@x.io".to_string(), Some(&"a@x.io".to_string()));
    /// changes.track("first_name", &"Ada".to_string(), None);
    /// assert!(changes.is_empty());
    ///
    /// changes.track("last_name", &"Byron".to_string(), Some(&"Lovelace".to_string()));
    /// assert_eq!(changes.len(), 1);
    /// ```
    pub fn track<T>(&mut self, field: &str, current: &T, requested: Option<&T>)
    where
        T: PartialEq + Clone + Into<serde_json::Value>,
    {
        if let Some(requested) = requested {
            if requested != current {
                self.0.insert(
                    field.to_string(),
                    FieldChange {
                        old: current.clone().into(),
                        new: requested.clone().into(),
                    },
                );
            }
        }
    }

    /// Whether no field changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of changed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Look up the change recorded for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    /// Iterate over changed fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldChange)> {
        self.0.iter().map(|(field, change)| (field.as_str(), change))
    }
}
