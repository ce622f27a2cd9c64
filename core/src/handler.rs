//! Handler contracts.
//!
//! Handlers are the application side of the consumer boundary. The pipeline owns
//! polling, decoding, backoff and acknowledgment; a handler owns the business effect of
//! one event (or one batch of events) and reports success or failure.
//!
//! A handler returning `Err` leaves the message(s) unacknowledged, so the backend will
//! deliver them again once the visibility window expires. Handlers must therefore
//! tolerate duplicates.
//!
//! # Example
//!
//! ```
//! use courier_core::handler::{Handler, handler_fn};
//!
//! let handler = handler_fn(|name: String| async move {
//!     anyhow::ensure!(!name.is_empty(), "empty name");
//!     Ok(())
//! });
//!
//! # futures::executor::block_on(async {
//! assert!(handler.handle("ada".to_string()).await.is_ok());
//! assert!(handler.handle(String::new()).await.is_err());
//! # });
//! ```

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Handles one event at a time.
///
/// # Thread Safety
///
/// Handlers run on the consumer's background task and must be `Send + Sync`.
pub trait Handler<E>: Send + Sync {
    /// Handle a single event.
    ///
    /// # Errors
    ///
    /// Any error leaves the message unacknowledged for redelivery.
    fn handle(&self, event: E) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Handles every event of one poll in a single call.
pub trait BatchHandler<E>: Send + Sync {
    /// Handle a batch of events, in the order they were received.
    ///
    /// # Errors
    ///
    /// Any error leaves the whole batch unacknowledged for redelivery.
    fn handle_batch(&self, events: Vec<E>) -> BoxFuture<'_, anyhow::Result<()>>;
}

impl<E, H> Handler<E> for Arc<H>
where
    H: Handler<E> + ?Sized,
{
    fn handle(&self, event: E) -> BoxFuture<'_, anyhow::Result<()>> {
        (**self).handle(event)
    }
}

impl<E, H> BatchHandler<E> for Arc<H>
where
    H: BatchHandler<E> + ?Sized,
{
    fn handle_batch(&self, events: Vec<E>) -> BoxFuture<'_, anyhow::Result<()>> {
        (**self).handle_batch(events)
    }
}

/// A [`Handler`] built from an async closure. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure `event -> anyhow::Result<()>` as a [`Handler`].
pub const fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn { f }
}

impl<E, F, Fut> Handler<E> for HandlerFn<F>
where
    F: Fn(E) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handle(&self, event: E) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin((self.f)(event))
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

/// A [`BatchHandler`] built from an async closure. See [`batch_handler_fn`].
#[derive(Clone)]
pub struct BatchHandlerFn<F> {
    f: F,
}

/// Wrap an async closure `events -> anyhow::Result<()>` as a [`BatchHandler`].
pub const fn batch_handler_fn<F>(f: F) -> BatchHandlerFn<F> {
    BatchHandlerFn { f }
}

impl<E, F, Fut> BatchHandler<E> for BatchHandlerFn<F>
where
    F: Fn(Vec<E>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handle_batch(&self, events: Vec<E>) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin((self.f)(events))
    }
}

impl<F> fmt::Debug for BatchHandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHandlerFn").finish_non_exhaustive()
    }
}
