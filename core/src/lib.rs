//! # Courier Core
//!
//! Core traits and types for the Courier event pipeline.
//!
//! This crate describes *what* travels through the pipeline and the contracts at its
//! edges. It performs no I/O of its own: the runtime crate drives publishing and
//! consuming, and backend crates (such as `courier-aws`) implement the client traits.
//!
//! ## Core Concepts
//!
//! - **Event**: an immutable fact with a type, a unique id, an aggregate id and a timestamp
//! - **Codec**: stateless conversion between an event and its byte payload
//! - **Handler**: application code invoked for each event (or each batch of events)
//! - **Backend clients**: topic-like publish and queue-like receive/delete boundaries
//! - **Publisher**: serializes and delivers events to a topic
//! - **Transaction manager**: the storage boundary used for publish-on-commit
//!
//! ## Delivery Model
//!
//! - At-least-once: a message is only acknowledged after its handler succeeded
//! - Deduplication and grouping are delegated to the backend, keyed by event id and
//!   aggregate id
//! - Events are published after the storage transaction commits, never inside it
//!
//! ## Example
//!
//! ```ignore
//! use courier_core::prelude::*;
//!
//! // Publish after the transaction has committed
//! let user = store
//!     .with_transaction(move |tx: &mut UserTx| Box::pin(async move { Ok(tx.insert(new_user)) }))
//!     .await?;
//! let event = UserCreated::new(&user.id, &user.email, &SystemClock);
//! publisher.publish(&UserEvent::from(event)).await?;
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod backend;
pub mod codec;
pub mod event;
pub mod handler;
pub mod publish;
pub mod transaction;

/// Environment module - injected dependencies
///
/// Components that need the current time take a [`Clock`](environment::Clock) so tests
/// can pin it.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = chrono::Utc::now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

/// Convenience re-exports for pipeline users.
pub mod prelude {
    pub use crate::backend::{BackendError, QueueClient, TopicClient};
    pub use crate::codec::{Deserializer, JsonDeserializer, JsonSerializer, Serializer};
    pub use crate::environment::{Clock, SystemClock};
    pub use crate::event::{Changes, Event, EventError, EventMetadata, FieldChange};
    pub use crate::handler::{BatchHandler, Handler, batch_handler_fn, handler_fn};
    pub use crate::publish::{PublishError, Publisher};
    pub use crate::transaction::{TransactionError, TransactionManager};
}
