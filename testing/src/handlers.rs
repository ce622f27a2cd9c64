//! Recording handlers and an instrumented deserializer.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use courier_core::codec::Deserializer;
use courier_core::event::EventError;
use courier_core::handler::{BatchHandler, Handler};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// A [`Handler`] that records the events it is given.
///
/// By default every call succeeds. [`fail_when`](Self::fail_when) makes calls fail for
/// matching events; failed events are still recorded as attempts.
pub struct RecordingHandler<E> {
    attempts: Arc<Mutex<Vec<E>>>,
    handled: Arc<Mutex<Vec<E>>>,
    fail_when: Option<Predicate<E>>,
}

impl<E: Clone + Send + 'static> RecordingHandler<E> {
    /// Create a handler that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(Mutex::new(Vec::new())),
            handled: Arc::new(Mutex::new(Vec::new())),
            fail_when: None,
        }
    }

    /// Fail for events matching `predicate`.
    #[must_use]
    pub fn fail_when(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Arc::new(predicate));
        self
    }

    /// Every event the handler was invoked with, in order.
    #[must_use]
    pub fn attempts(&self) -> Vec<E> {
        self.attempts.lock().unwrap().clone()
    }

    /// Events the handler succeeded on, in order.
    #[must_use]
    pub fn handled(&self) -> Vec<E> {
        self.handled.lock().unwrap().clone()
    }

    /// Number of invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

impl<E: Clone + Send + 'static> Default for RecordingHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for RecordingHandler<E> {
    fn clone(&self) -> Self {
        Self {
            attempts: Arc::clone(&self.attempts),
            handled: Arc::clone(&self.handled),
            fail_when: self.fail_when.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> Handler<E> for RecordingHandler<E> {
    fn handle(&self, event: E) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.attempts.lock().unwrap().push(event.clone());
            if self.fail_when.as_ref().is_some_and(|fail| fail(&event)) {
                anyhow::bail!("handler rejected event");
            }
            self.handled.lock().unwrap().push(event);
            Ok(())
        })
    }
}

/// A [`BatchHandler`] that records the batches it is given.
pub struct RecordingBatchHandler<E> {
    batches: Arc<Mutex<Vec<Vec<E>>>>,
    failing: bool,
}

impl<E: Clone + Send + 'static> RecordingBatchHandler<E> {
    /// Create a batch handler that accepts every batch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            failing: false,
        }
    }

    /// Create a batch handler that rejects every batch.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    /// Every batch the handler was invoked with.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<E>> {
        self.batches.lock().unwrap().clone()
    }
}

impl<E: Clone + Send + 'static> Default for RecordingBatchHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for RecordingBatchHandler<E> {
    fn clone(&self) -> Self {
        Self {
            batches: Arc::clone(&self.batches),
            failing: self.failing,
        }
    }
}

impl<E: Clone + Send + 'static> BatchHandler<E> for RecordingBatchHandler<E> {
    fn handle_batch(&self, events: Vec<E>) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let size = events.len();
            self.batches.lock().unwrap().push(events);
            if self.failing {
                anyhow::bail!("batch handler rejected {size} events");
            }
            Ok(())
        })
    }
}

/// Wraps a [`Deserializer`] and counts its invocations.
#[derive(Debug)]
pub struct CountingDeserializer<D> {
    inner: D,
    calls: Arc<AtomicUsize>,
}

impl<D> CountingDeserializer<D> {
    /// Wrap `inner`.
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A shared counter that keeps working after the deserializer is moved into a
    /// consumer.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Number of `deserialize` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<E, D: Deserializer<E>> Deserializer<E> for CountingDeserializer<D> {
    fn deserialize(&self, bytes: &[u8]) -> Result<E, EventError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.deserialize(bytes)
    }
}
