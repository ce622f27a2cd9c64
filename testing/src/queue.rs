//! In-memory queue with a scripted sequence of poll results.
//!
//! [`ScriptedQueue`] answers each `receive` with the next scripted result. Once the
//! script is exhausted it behaves like an idle long-poll: it waits for the request's
//! wait time and returns nothing (or keeps failing, see
//! [`ScriptedQueue::fail_when_exhausted`]). Every call is recorded for assertions.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use courier_core::backend::{
    BackendError, DeleteBatchOutput, DeleteEntry, FailedEntry, QueueClient, ReceiveRequest,
    ReceivedMessage,
};
use futures::future::BoxFuture;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// A recorded `receive` call.
#[derive(Clone, Debug)]
pub struct ReceiveCall {
    /// The request as sent by the consumer
    pub request: ReceiveRequest,
    /// When the call started (tokio time, so it follows a paused clock)
    pub at: Instant,
}

#[derive(Default)]
struct State {
    script: VecDeque<Result<Vec<ReceivedMessage>, BackendError>>,
    exhausted_error: Option<BackendError>,
    receives: Vec<ReceiveCall>,
    deleted: Vec<String>,
    delete_calls: usize,
    delete_batches: Vec<Vec<DeleteEntry>>,
    failing_receipts: HashSet<String>,
}

/// Scripted in-memory [`QueueClient`].
///
/// # Example
///
/// ```
/// use courier_testing::ScriptedQueue;
/// use courier_core::backend::{QueueClient, ReceiveRequest, ReceivedMessage};
/// use std::time::Duration;
///
/// # tokio_test_block_on(async {
/// let queue = ScriptedQueue::new();
/// queue.push_messages(vec![ReceivedMessage::new("m-1", b"{}".to_vec(), "r-1")]);
///
/// let request = ReceiveRequest {
///     queue: "q".to_string(),
///     max_messages: 10,
///     visibility_timeout: Duration::from_secs(30),
///     wait_time: Duration::ZERO,
/// };
/// assert_eq!(queue.receive(request.clone()).await.unwrap().len(), 1);
/// assert!(queue.receive(request).await.unwrap().is_empty());
/// assert_eq!(queue.receive_count(), 2);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone, Default)]
pub struct ScriptedQueue {
    state: Arc<Mutex<State>>,
}

impl ScriptedQueue {
    /// Create a queue with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a poll returning `messages`.
    pub fn push_messages(&self, messages: Vec<ReceivedMessage>) {
        self.state.lock().unwrap().script.push_back(Ok(messages));
    }

    /// Script a poll returning nothing, immediately.
    pub fn push_empty(&self) {
        self.push_messages(Vec::new());
    }

    /// Script a failing poll.
    pub fn push_error(&self, error: BackendError) {
        self.state.lock().unwrap().script.push_back(Err(error));
    }

    /// Once the script is exhausted, fail every poll with `error` instead of idling.
    pub fn fail_when_exhausted(&self, error: BackendError) {
        self.state.lock().unwrap().exhausted_error = Some(error);
    }

    /// Make deletes of `receipt_handle` fail.
    pub fn fail_delete(&self, receipt_handle: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .failing_receipts
            .insert(receipt_handle.into());
    }

    /// Recorded `receive` calls.
    #[must_use]
    pub fn receives(&self) -> Vec<ReceiveCall> {
        self.state.lock().unwrap().receives.clone()
    }

    /// Number of `receive` calls so far.
    #[must_use]
    pub fn receive_count(&self) -> usize {
        self.state.lock().unwrap().receives.len()
    }

    /// Receipt handles successfully deleted, single and batch, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Number of single `delete` calls (successful or not).
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.state.lock().unwrap().delete_calls
    }

    /// Entries of every `delete_batch` call.
    #[must_use]
    pub fn delete_batches(&self) -> Vec<Vec<DeleteEntry>> {
        self.state.lock().unwrap().delete_batches.clone()
    }

    /// Wait until at least `count` polls have been issued.
    ///
    /// Sleeps in small steps, so under a paused clock it lets virtual time advance.
    pub async fn wait_for_receives(&self, count: usize) {
        while self.receive_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl std::fmt::Debug for ScriptedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("ScriptedQueue")
            .field("scripted", &state.script.len())
            .field("receives", &state.receives.len())
            .field("deleted", &state.deleted)
            .finish()
    }
}

impl QueueClient for ScriptedQueue {
    fn receive(
        &self,
        request: ReceiveRequest,
    ) -> BoxFuture<'_, Result<Vec<ReceivedMessage>, BackendError>> {
        Box::pin(async move {
            let wait_time = request.wait_time;
            let max_messages = usize::try_from(request.max_messages).unwrap_or(usize::MAX);
            let (next, exhausted_error) = {
                let mut state = self.state.lock().unwrap();
                state.receives.push(ReceiveCall {
                    request,
                    at: Instant::now(),
                });
                let mut next = state.script.pop_front();
                // Messages beyond the requested maximum stay queued for the next poll
                if let Some(Ok(messages)) = &mut next {
                    if messages.len() > max_messages {
                        let rest = messages.split_off(max_messages);
                        state.script.push_front(Ok(rest));
                    }
                }
                (next, state.exhausted_error.clone())
            };

            match (next, exhausted_error) {
                (Some(result), _) => result,
                (None, Some(error)) => Err(error),
                (None, None) => {
                    tokio::time::sleep(wait_time).await;
                    Ok(Vec::new())
                }
            }
        })
    }

    fn delete<'a>(
        &'a self,
        queue: &'a str,
        receipt_handle: &'a str,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.delete_calls += 1;
            if state.failing_receipts.contains(receipt_handle) {
                return Err(BackendError::DeleteFailed {
                    queue: queue.to_string(),
                    reason: format!("receipt handle {receipt_handle} is invalid"),
                });
            }
            state.deleted.push(receipt_handle.to_string());
            Ok(())
        })
    }

    fn delete_batch<'a>(
        &'a self,
        _queue: &'a str,
        entries: Vec<DeleteEntry>,
    ) -> BoxFuture<'a, Result<DeleteBatchOutput, BackendError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let mut output = DeleteBatchOutput::default();
            for entry in &entries {
                if state.failing_receipts.contains(&entry.receipt_handle) {
                    output.failed.push(FailedEntry::new(
                        entry.id.clone(),
                        "ReceiptHandleIsInvalid",
                        Some(format!("receipt handle {} is invalid", entry.receipt_handle)),
                    ));
                } else {
                    state.deleted.push(entry.receipt_handle.clone());
                    output.successful.push(entry.id.clone());
                }
            }
            state.delete_batches.push(entries);
            Ok(output)
        })
    }
}
