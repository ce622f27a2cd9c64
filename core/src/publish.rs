//! Publisher contract.
//!
//! A [`Publisher`] serializes events and delivers them to a topic in one backend call
//! per batch. Serialization happens up front for the whole batch: if any event fails
//! to encode, nothing is sent.
//!
//! Publishing is meant to happen *after* the storage transaction that produced the
//! events has committed (see [`transaction`](crate::transaction)).

use crate::backend::BackendError;
use crate::event::{Event, EventError};
use futures::future::BoxFuture;
use thiserror::Error;

/// Errors returned by [`Publisher`] operations.
#[derive(Error, Debug)]
pub enum PublishError {
    /// An event of the batch could not be serialized; nothing was sent.
    #[error("Failed to serialize event {event_id} ({event_type}) of aggregate {aggregate_id}: {source}")]
    Serialization {
        /// Id of the offending event
        event_id: String,
        /// Type of the offending event
        event_type: String,
        /// Aggregate of the offending event
        aggregate_id: String,
        /// The underlying codec error
        #[source]
        source: EventError,
    },

    /// The publish call failed as a whole.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The call succeeded but the backend rejected some entries.
    #[error("{failed} of {total} events were rejected by the backend")]
    PartialBatch {
        /// Number of rejected entries
        failed: usize,
        /// Batch size
        total: usize,
        /// Event ids of the rejected entries
        failed_ids: Vec<String>,
    },
}

/// Delivers events of type `E` to a topic.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so services can hold an `Arc<dyn Publisher<E>>`.
pub trait Publisher<E: Event>: Send + Sync {
    /// Publish a batch of events in one backend call.
    ///
    /// # Errors
    ///
    /// - [`PublishError::Serialization`] if any event fails to encode (nothing is sent)
    /// - [`PublishError::Backend`] if the call fails
    /// - [`PublishError::PartialBatch`] if the backend rejects one or more entries
    fn publish_batch<'a>(&'a self, events: &'a [E]) -> BoxFuture<'a, Result<(), PublishError>>;

    /// Publish a single event. Equivalent to a batch of one.
    ///
    /// # Errors
    ///
    /// See [`publish_batch`](Self::publish_batch).
    fn publish<'a>(&'a self, event: &'a E) -> BoxFuture<'a, Result<(), PublishError>> {
        self.publish_batch(std::slice::from_ref(event))
    }
}

impl<E, P> Publisher<E> for std::sync::Arc<P>
where
    E: Event,
    P: Publisher<E> + ?Sized,
{
    fn publish_batch<'a>(&'a self, events: &'a [E]) -> BoxFuture<'a, Result<(), PublishError>> {
        (**self).publish_batch(events)
    }

    fn publish<'a>(&'a self, event: &'a E) -> BoxFuture<'a, Result<(), PublishError>> {
        (**self).publish(event)
    }
}
