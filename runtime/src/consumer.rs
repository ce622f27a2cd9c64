//! Queue consumer.
//!
//! A [`QueueConsumer`] long-polls one queue, decodes each message into a typed event,
//! hands it to application code and deletes (acks) it only once handling succeeded.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start──► Running ──token cancelled──► Stopping ──cycle done──► Stopped
//! ```
//!
//! [`start`](QueueConsumer::start) and [`start_batch`](QueueConsumer::start_batch)
//! spawn the poll loop and return a [`ConsumerHandle`] immediately. Cancellation is
//! cooperative: the loop notices it between cycles, so an in-flight poll, handler call
//! or ack is never interrupted. A poll-error backoff sleep, on the other hand, ends as
//! soon as the token is cancelled.
//!
//! # Dispatch modes
//!
//! **Single-item** ([`run_single_cycle`](QueueConsumer::run_single_cycle)): messages
//! are processed in the order received. Each one is decoded, handled and acked before
//! the next. The first decode, handler or ack failure stops the cycle: earlier
//! messages stay acked, the failing message and everything after it stay unacked and
//! are redelivered once their visibility window expires.
//!
//! **Batch** ([`run_batch_cycle`](QueueConsumer::run_batch_cycle)): every message is
//! decoded first (one failure aborts the cycle, nothing is acked), the batch handler is
//! invoked once with all events (a failure aborts, nothing is acked), and then every
//! message is acked individually. One failed ack does not prevent the others.
//!
//! In both modes a failed poll is logged and followed by a fixed backoff, and an empty
//! poll starts the next cycle right away (the long-poll already bounded the wait).
//! Processing errors never stop the loop; only cancellation does. A panicking
//! deserializer or handler counts as a failure of that message (or batch).

use crate::metrics::ConsumerMetrics;
use courier_core::backend::{BackendError, DeleteEntry, QueueClient, ReceiveRequest, ReceivedMessage};
use courier_core::codec::Deserializer;
use courier_core::event::EventError;
use courier_core::handler::{BatchHandler, Handler};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Instrument, Span};

/// Default upper bound on messages per poll.
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 10;
/// Largest batch the backend hands out per poll.
pub const MAX_BATCH_SIZE: u32 = 10;
/// Default time a received message stays hidden from other receivers.
pub const DEFAULT_VISIBILITY_WINDOW: Duration = Duration::from_secs(30);
/// Default long-poll duration.
pub const DEFAULT_POLL_WAIT_TIME: Duration = Duration::from_secs(20);
/// Longest long-poll the backend accepts.
pub const MAX_POLL_WAIT_TIME: Duration = Duration::from_secs(20);
/// Default pause after a failed poll.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Errors returned by consumer operations.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// A delete call failed as a whole
    #[error("Failed to acknowledge message: {0}")]
    Ack(#[source] BackendError),

    /// A batch delete succeeded but some entries were rejected
    #[error("Failed to acknowledge {failed} messages")]
    PartialAck {
        /// Number of rejected entries
        failed: usize,
        /// Entry ids (receipt handles) of the rejected entries
        failed_ids: Vec<String>,
    },

    /// The background task panicked or was aborted
    #[error("Consumer task failed: {0}")]
    TaskFailed(String),

    /// The consumer did not stop within the allotted time
    #[error("Consumer for queue '{queue}' did not stop within {timeout:?}")]
    ShutdownTimeout {
        /// Queue of the consumer
        queue: String,
        /// The allotted time
        timeout: Duration,
    },
}

/// Per-consumer settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Queue identity (URL or name)
    pub queue: String,
    /// Upper bound on messages pulled per poll (`1..=10`)
    pub max_batch_size: u32,
    /// How long a received-but-unacked message stays hidden
    pub visibility_window: Duration,
    /// Long-poll duration (at most 20 seconds)
    pub poll_wait_time: Duration,
    /// Pause after a failed poll
    pub error_backoff: Duration,
}

impl ConsumerConfig {
    /// Create a configuration for `queue` with default settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_runtime::ConsumerConfig;
    /// use std::time::Duration;
    ///
    /// let config = ConsumerConfig::new("https://sqs.local/000000000000/user-created")
    ///     .with_max_batch_size(1)
    ///     .with_poll_wait_time(Duration::from_secs(5));
    /// assert_eq!(config.visibility_window, Duration::from_secs(30));
    /// ```
    #[must_use]
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            visibility_window: DEFAULT_VISIBILITY_WINDOW,
            poll_wait_time: DEFAULT_POLL_WAIT_TIME,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Set the maximum number of messages per poll.
    #[must_use]
    pub const fn with_max_batch_size(mut self, max_batch_size: u32) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set the visibility window.
    #[must_use]
    pub const fn with_visibility_window(mut self, visibility_window: Duration) -> Self {
        self.visibility_window = visibility_window;
        self
    }

    /// Set the long-poll duration.
    #[must_use]
    pub const fn with_poll_wait_time(mut self, poll_wait_time: Duration) -> Self {
        self.poll_wait_time = poll_wait_time;
        self
    }

    /// Set the pause after a failed poll.
    #[must_use]
    pub const fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    /// Clamp settings into the ranges the backend accepts, warning about each change.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let batch_size = self.max_batch_size.clamp(1, MAX_BATCH_SIZE);
        if batch_size != self.max_batch_size {
            tracing::warn!(
                queue = %self.queue,
                requested = self.max_batch_size,
                using = batch_size,
                "max_batch_size out of range, clamping"
            );
            self.max_batch_size = batch_size;
        }

        if self.poll_wait_time > MAX_POLL_WAIT_TIME {
            tracing::warn!(
                queue = %self.queue,
                requested_secs = self.poll_wait_time.as_secs(),
                using_secs = MAX_POLL_WAIT_TIME.as_secs(),
                "poll_wait_time too long, clamping"
            );
            self.poll_wait_time = MAX_POLL_WAIT_TIME;
        }

        self
    }

    fn receive_request(&self) -> ReceiveRequest {
        ReceiveRequest {
            queue: self.queue.clone(),
            max_messages: self.max_batch_size,
            visibility_timeout: self.visibility_window,
            wait_time: self.poll_wait_time,
        }
    }
}

/// Lifecycle state of a consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    /// Constructed, not started
    Created,
    /// Poll loop running
    Running,
    /// Cancellation observed, finishing the current cycle
    Stopping,
    /// Poll loop exited
    Stopped,
}

/// How a cycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The poll returned no messages
    Empty,
    /// The poll failed
    PollFailed,
    /// Every received message was handled and acked
    Completed,
    /// Message `index` could not be decoded
    DecodeFailed {
        /// Position of the message in the poll result
        index: usize,
    },
    /// The handler failed. In batch mode the whole batch failed and `index` is 0.
    HandlerFailed {
        /// Position of the message in the poll result
        index: usize,
    },
    /// Acking message `index` failed. In batch mode this is the first failed ack.
    AckFailed {
        /// Position of the message in the poll result
        index: usize,
    },
}

/// What one receive/process/ack cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleReport {
    /// Messages returned by the poll
    pub received: usize,
    /// Messages handled successfully
    pub handled: usize,
    /// Messages deleted
    pub acked: usize,
    /// How the cycle ended
    pub outcome: CycleOutcome,
}

impl CycleReport {
    const fn empty(outcome: CycleOutcome) -> Self {
        Self {
            received: 0,
            handled: 0,
            acked: 0,
            outcome,
        }
    }
}

/// Consumes one queue carrying events of type `E`.
pub struct QueueConsumer<E> {
    client: Arc<dyn QueueClient>,
    config: ConsumerConfig,
    span: Span,
    metrics: ConsumerMetrics,
    state: watch::Sender<ConsumerState>,
    _event: PhantomData<fn() -> E>,
}

impl<E> QueueConsumer<E> {
    /// Create a consumer. Out-of-range settings are clamped with a warning.
    #[must_use]
    pub fn new(client: Arc<dyn QueueClient>, config: ConsumerConfig) -> Self {
        let config = config.normalized();
        let (state, _) = watch::channel(ConsumerState::Created);
        Self {
            client,
            span: tracing::info_span!("consumer", queue = %config.queue),
            metrics: ConsumerMetrics::new(config.queue.clone()),
            config,
            state,
            _event: PhantomData,
        }
    }

    /// Log inside `span` instead of the default one.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The effective (clamped) configuration.
    #[must_use]
    pub const fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Delete one message.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Ack`] if the delete fails. The failure is logged.
    pub async fn ack(&self, receipt_handle: &str) -> Result<(), ConsumerError> {
        async {
            match self.client.delete(&self.config.queue, receipt_handle).await {
                Ok(()) => {
                    self.metrics.record_acked(1);
                    tracing::debug!(receipt_handle, "Message acknowledged");
                    Ok(())
                }
                Err(err) => {
                    self.metrics.record_ack_errors(1);
                    tracing::error!(receipt_handle, error = %err, "Failed to acknowledge message");
                    Err(ConsumerError::Ack(err))
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    /// Delete several messages in one call, one entry per receipt handle.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Ack`] if the call fails, or
    /// [`ConsumerError::PartialAck`] if some entries were rejected. Failures are logged.
    pub async fn batch_ack(&self, receipt_handles: &[String]) -> Result<(), ConsumerError> {
        if receipt_handles.is_empty() {
            return Ok(());
        }

        async {
            let entries = receipt_handles
                .iter()
                .map(|receipt_handle| DeleteEntry {
                    id: receipt_handle.clone(),
                    receipt_handle: receipt_handle.clone(),
                })
                .collect();

            let output = match self.client.delete_batch(&self.config.queue, entries).await {
                Ok(output) => output,
                Err(err) => {
                    self.metrics.record_ack_errors(receipt_handles.len());
                    tracing::error!(
                        count = receipt_handles.len(),
                        error = %err,
                        "Failed to acknowledge messages"
                    );
                    return Err(ConsumerError::Ack(err));
                }
            };

            self.metrics.record_acked(output.successful.len());
            if output.failed.is_empty() {
                tracing::debug!(count = output.successful.len(), "Messages acknowledged");
                return Ok(());
            }

            self.metrics.record_ack_errors(output.failed.len());
            for failed in &output.failed {
                tracing::error!(
                    receipt_handle = %failed.id,
                    code = %failed.code,
                    error = failed.message.as_deref().unwrap_or("unknown error"),
                    "Failed to acknowledge message"
                );
            }
            Err(ConsumerError::PartialAck {
                failed: output.failed.len(),
                failed_ids: output.failed.into_iter().map(|failed| failed.id).collect(),
            })
        }
        .instrument(self.span.clone())
        .await
    }

    /// Poll once, returning `Err(outcome)` when there is nothing to process.
    async fn poll(&self) -> Result<Vec<ReceivedMessage>, CycleOutcome> {
        match self.client.receive(self.config.receive_request()).await {
            Ok(messages) if messages.is_empty() => {
                tracing::trace!("No messages received");
                Err(CycleOutcome::Empty)
            }
            Ok(messages) => {
                self.metrics.record_received(messages.len());
                tracing::debug!(count = messages.len(), "Received messages");
                Ok(messages)
            }
            Err(err) => {
                self.metrics.record_poll_error();
                tracing::error!(error = %err, "Failed to receive messages");
                Err(CycleOutcome::PollFailed)
            }
        }
    }

    fn decode<D>(&self, deserializer: &D, message: &ReceivedMessage) -> Option<E>
    where
        D: Deserializer<E> + ?Sized,
    {
        let decoded = std::panic::catch_unwind(AssertUnwindSafe(|| {
            deserializer.deserialize(&message.body)
        }))
        .unwrap_or_else(|payload| {
            Err(EventError::DeserializationError(format!(
                "deserializer panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

        match decoded {
            Ok(event) => Some(event),
            Err(err) => {
                self.metrics.record_decode_error();
                tracing::error!(
                    message_id = %message.message_id,
                    receipt_handle = %message.receipt_handle,
                    error = %err,
                    "Failed to deserialize message"
                );
                None
            }
        }
    }

    /// Run one single-item cycle: poll, then decode, handle and ack each message in
    /// order, stopping at the first failure.
    pub async fn run_single_cycle<D, H>(&self, deserializer: &D, handler: &H) -> CycleReport
    where
        D: Deserializer<E> + ?Sized,
        H: Handler<E> + ?Sized,
    {
        async {
            let messages = match self.poll().await {
                Ok(messages) => messages,
                Err(outcome) => return CycleReport::empty(outcome),
            };

            let mut report = CycleReport {
                received: messages.len(),
                handled: 0,
                acked: 0,
                outcome: CycleOutcome::Completed,
            };

            for (index, message) in messages.iter().enumerate() {
                let Some(event) = self.decode(deserializer, message) else {
                    report.outcome = CycleOutcome::DecodeFailed { index };
                    break;
                };

                if let Err(err) = handler_outcome(handler.handle(event)).await {
                    self.metrics.record_handler_error();
                    tracing::error!(
                        message_id = %message.message_id,
                        error = %err,
                        "Handler failed, leaving message for redelivery"
                    );
                    report.outcome = CycleOutcome::HandlerFailed { index };
                    break;
                }
                report.handled += 1;
                self.metrics.record_handled(1);

                if self.ack(&message.receipt_handle).await.is_err() {
                    report.outcome = CycleOutcome::AckFailed { index };
                    break;
                }
                report.acked += 1;
            }

            if report.outcome != CycleOutcome::Completed {
                tracing::warn!(
                    unacked = report.received - report.acked,
                    "Stopped processing batch early, remaining messages will be redelivered"
                );
            }
            report
        }
        .instrument(self.span.clone())
        .await
    }

    /// Run one batch cycle: poll, decode everything, invoke the batch handler once,
    /// then ack every message.
    pub async fn run_batch_cycle<D, H>(&self, deserializer: &D, handler: &H) -> CycleReport
    where
        D: Deserializer<E> + ?Sized,
        H: BatchHandler<E> + ?Sized,
    {
        async {
            let messages = match self.poll().await {
                Ok(messages) => messages,
                Err(outcome) => return CycleReport::empty(outcome),
            };

            let mut report = CycleReport {
                received: messages.len(),
                handled: 0,
                acked: 0,
                outcome: CycleOutcome::Completed,
            };

            let mut events = Vec::with_capacity(messages.len());
            for (index, message) in messages.iter().enumerate() {
                match self.decode(deserializer, message) {
                    Some(event) => events.push(event),
                    None => {
                        report.outcome = CycleOutcome::DecodeFailed { index };
                        return report;
                    }
                }
            }

            if let Err(err) = handler_outcome(handler.handle_batch(events)).await {
                self.metrics.record_handler_error();
                tracing::error!(
                    count = messages.len(),
                    error = %err,
                    "Batch handler failed, leaving batch for redelivery"
                );
                report.outcome = CycleOutcome::HandlerFailed { index: 0 };
                return report;
            }
            report.handled = messages.len();
            self.metrics.record_handled(messages.len());

            for (index, message) in messages.iter().enumerate() {
                match self.ack(&message.receipt_handle).await {
                    Ok(()) => report.acked += 1,
                    Err(_) => {
                        if report.outcome == CycleOutcome::Completed {
                            report.outcome = CycleOutcome::AckFailed { index };
                        }
                    }
                }
            }
            report
        }
        .instrument(self.span.clone())
        .await
    }
}

impl<E: Send + 'static> QueueConsumer<E> {
    /// Start the single-item poll loop on a background task.
    ///
    /// Returns immediately with a handle. The loop runs until `token` is cancelled.
    /// Logs go to the span of this consumer and the subscriber active at the call.
    pub fn start<D, H>(self, deserializer: D, handler: H, token: CancellationToken) -> ConsumerHandle
    where
        D: Deserializer<E> + 'static,
        H: Handler<E> + 'static,
    {
        self.spawn("single", token, move |consumer, token| async move {
            consumer
                .drive(&token, || consumer.run_single_cycle(&deserializer, &handler))
                .await;
        })
    }

    /// Start the batch poll loop on a background task.
    ///
    /// Returns immediately with a handle. The loop runs until `token` is cancelled.
    pub fn start_batch<D, H>(
        self,
        deserializer: D,
        handler: H,
        token: CancellationToken,
    ) -> ConsumerHandle
    where
        D: Deserializer<E> + 'static,
        H: BatchHandler<E> + 'static,
    {
        self.spawn("batch", token, move |consumer, token| async move {
            consumer
                .drive(&token, || consumer.run_batch_cycle(&deserializer, &handler))
                .await;
        })
    }

    fn spawn<F, Fut>(self, mode: &'static str, token: CancellationToken, run: F) -> ConsumerHandle
    where
        F: FnOnce(Arc<Self>, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = self.state.subscribe();
        let queue = self.config.queue.clone();
        let span = self.span.clone();

        self.state.send_replace(ConsumerState::Running);
        span.in_scope(|| {
            tracing::info!(
                mode,
                max_batch_size = self.config.max_batch_size,
                visibility_window_secs = self.config.visibility_window.as_secs(),
                poll_wait_secs = self.config.poll_wait_time.as_secs(),
                "Consumer started"
            );
        });

        let consumer = Arc::new(self);
        let task_token = token.clone();
        let task = tokio::spawn(
            async move {
                let _stopped = StoppedOnDrop(Arc::clone(&consumer));
                run(Arc::clone(&consumer), task_token).await;
                tracing::info!("Consumer stopped");
            }
            .instrument(span)
            .with_current_subscriber(),
        );

        ConsumerHandle {
            queue,
            state,
            token,
            task,
        }
    }

    /// Run cycles until cancelled, backing off after failed polls.
    async fn drive<'a, C, Fut>(&'a self, token: &CancellationToken, mut cycle: C)
    where
        C: FnMut() -> Fut,
        Fut: Future<Output = CycleReport> + 'a,
    {
        while !token.is_cancelled() {
            let current = cycle();
            tokio::pin!(current);

            // Finish the cycle even when cancelled, but report Stopping right away
            let report = tokio::select! {
                biased;
                report = &mut current => report,
                () = token.cancelled() => {
                    self.mark_stopping();
                    current.await
                }
            };

            if report.outcome == CycleOutcome::PollFailed {
                tracing::warn!(
                    backoff_ms = u64::try_from(self.config.error_backoff.as_millis()).unwrap_or(u64::MAX),
                    "Backing off after failed poll"
                );
                tokio::select! {
                    () = token.cancelled() => {}
                    () = tokio::time::sleep(self.config.error_backoff) => {}
                }
            }
        }
        self.mark_stopping();
    }

    fn mark_stopping(&self) {
        if *self.state.borrow() == ConsumerState::Running {
            self.state.send_replace(ConsumerState::Stopping);
            tracing::info!("Cancellation requested, stopping consumer");
        }
    }
}

/// Publishes [`ConsumerState::Stopped`] when the poll task ends, including by unwinding
/// or abort.
struct StoppedOnDrop<E>(Arc<QueueConsumer<E>>);

impl<E> Drop for StoppedOnDrop<E> {
    fn drop(&mut self) {
        self.0.state.send_replace(ConsumerState::Stopped);
    }
}

/// Await a handler future, turning an `Err` or a panic into a loggable message.
async fn handler_outcome<F, HandlerError>(handling: F) -> Result<(), String>
where
    F: Future<Output = Result<(), HandlerError>>,
    HandlerError: std::fmt::Display,
{
    match AssertUnwindSafe(handling).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(format!("handler panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl<E> std::fmt::Debug for QueueConsumer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Handle to a running consumer.
///
/// Dropping the handle does not stop the consumer; cancel its token or call
/// [`shutdown`](Self::shutdown).
#[derive(Debug)]
pub struct ConsumerHandle {
    queue: String,
    state: watch::Receiver<ConsumerState>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// The queue this consumer polls.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Request shutdown by cancelling the consumer's token.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the background task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the background task to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::TaskFailed`] if the task panicked.
    pub async fn stopped(self) -> Result<(), ConsumerError> {
        self.task
            .await
            .map_err(|e| ConsumerError::TaskFailed(e.to_string()))
    }

    /// Cancel the consumer and wait at most `timeout` for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::ShutdownTimeout`] if the task is still running after
    /// `timeout` (it is aborted), or [`ConsumerError::TaskFailed`] if it panicked.
    pub async fn shutdown_within(self, timeout: Duration) -> Result<(), ConsumerError> {
        self.shutdown();
        let Self { queue, task, .. } = self;
        let abort = task.abort_handle();

        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined.map_err(|e| ConsumerError::TaskFailed(e.to_string())),
            Err(_) => {
                abort.abort();
                Err(ConsumerError::ShutdownTimeout { queue, timeout })
            }
        }
    }
}
