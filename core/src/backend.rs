//! Message backend abstraction.
//!
//! The pipeline talks to two kinds of backend endpoint:
//!
//! - a **topic** ([`TopicClient`]) that accepts batches of messages for fan-out, and
//! - a **queue** ([`QueueClient`]) that is long-polled for messages which are then
//!   deleted (acknowledged) once handled.
//!
//! ```text
//! ┌───────────┐  publish_batch  ┌─────────┐  fan-out  ┌─────────┐  receive   ┌──────────┐
//! │ Publisher │ ──────────────► │  Topic  │ ────────► │  Queue  │ ─────────► │ Consumer │
//! └───────────┘                 └─────────┘           └─────────┘ ◄───────── └──────────┘
//!                                                                   delete
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: a received message that is not deleted becomes visible
//!   again once its visibility window expires.
//! - **Backend-side deduplication**: each published entry carries a deduplication id
//!   (the event id) and a group id (the aggregate id).
//! - **Per-entry batch results**: batch calls may partially fail. Failures are reported
//!   per entry in the output rather than as an error of the whole call.
//!
//! # Implementations
//!
//! - `SnsTopicClient` / `SqsQueueClient` in `courier-aws` - for production
//! - `RecordingTopic` / `ScriptedQueue` in `courier-testing` - for tests
//!
//! # Dyn Compatibility
//!
//! Both traits return boxed futures instead of using `async fn` so they can be held as
//! `Arc<dyn TopicClient>` and `Arc<dyn QueueClient>`.

use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during backend operations.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// Failed to connect to the backend
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A publish call to a topic failed as a whole
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// A receive (poll) call on a queue failed
    #[error("Receive failed for queue '{queue}': {reason}")]
    ReceiveFailed {
        /// The queue that failed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// A delete (ack) call on a queue failed
    #[error("Delete failed for queue '{queue}': {reason}")]
    DeleteFailed {
        /// The queue that failed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// The request could not be built or was rejected as malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

/// One message of a batch publish request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishEntry {
    /// Batch-local entry id, echoed back in [`PublishBatchOutput`]
    pub id: String,
    /// Serialized message body
    pub body: Vec<u8>,
    /// Ordering group key
    pub group_id: String,
    /// Backend deduplication key
    pub deduplication_id: String,
    /// String message attributes
    pub attributes: BTreeMap<String, String>,
}

/// Per-entry outcome of a batch call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishBatchOutput {
    /// Ids of entries the backend accepted
    pub successful: Vec<String>,
    /// Entries the backend rejected
    pub failed: Vec<FailedEntry>,
}

/// An entry rejected by a batch call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedEntry {
    /// The caller-assigned entry id
    pub id: String,
    /// Backend error code
    pub code: String,
    /// Backend error message, if any
    pub message: Option<String>,
}

impl FailedEntry {
    /// Create a failed entry.
    #[must_use]
    pub fn new(id: impl Into<String>, code: impl Into<String>, message: Option<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            message,
        }
    }
}

/// Parameters of a single long-poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Queue identity (URL, name, ...)
    pub queue: String,
    /// Upper bound on messages returned
    pub max_messages: u32,
    /// How long received messages stay hidden from other receivers
    pub visibility_timeout: Duration,
    /// Long-poll duration
    pub wait_time: Duration,
}

/// A message received from a queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Backend message id
    pub message_id: String,
    /// Raw message body
    pub body: Vec<u8>,
    /// Opaque token required to delete this delivery
    pub receipt_handle: String,
    /// String message attributes
    pub attributes: HashMap<String, String>,
}

impl ReceivedMessage {
    /// Create a message with no attributes.
    #[must_use]
    pub fn new(
        message_id: impl Into<String>,
        body: impl Into<Vec<u8>>,
        receipt_handle: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            receipt_handle: receipt_handle.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add a string attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// One entry of a batch delete request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteEntry {
    /// Batch-local entry id, echoed back in [`DeleteBatchOutput`]
    pub id: String,
    /// Receipt handle of the delivery to delete
    pub receipt_handle: String,
}

/// Per-entry outcome of a batch delete.
pub type DeleteBatchOutput = PublishBatchOutput;

/// A topic-like endpoint accepting batches of messages.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one client is shared by every publisher of a
/// process.
pub trait TopicClient: Send + Sync {
    /// Publish a batch of entries in one network call.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the call as a whole fails. Rejections of individual
    /// entries are reported through [`PublishBatchOutput::failed`] instead.
    fn publish_batch<'a>(
        &'a self,
        topic: &'a str,
        entries: Vec<PublishEntry>,
    ) -> BoxFuture<'a, Result<PublishBatchOutput, BackendError>>;
}

/// A queue-like endpoint that is long-polled and acknowledged by deletion.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The handle is shared read-only by the consumer
/// loop; all coordination (visibility windows, redelivery counts) lives in the backend.
pub trait QueueClient: Send + Sync {
    /// Long-poll the queue for up to `request.max_messages` messages.
    ///
    /// Returns an empty list when the wait time elapsed without messages.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ReceiveFailed`] (or a transport error) when the poll fails.
    fn receive(
        &self,
        request: ReceiveRequest,
    ) -> BoxFuture<'_, Result<Vec<ReceivedMessage>, BackendError>>;

    /// Delete a single delivery.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::DeleteFailed`] when the delete fails.
    fn delete<'a>(
        &'a self,
        queue: &'a str,
        receipt_handle: &'a str,
    ) -> BoxFuture<'a, Result<(), BackendError>>;

    /// Delete several deliveries in one call.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the call as a whole fails. Per-entry failures are
    /// reported through [`DeleteBatchOutput::failed`].
    fn delete_batch<'a>(
        &'a self,
        queue: &'a str,
        entries: Vec<DeleteEntry>,
    ) -> BoxFuture<'a, Result<DeleteBatchOutput, BackendError>>;
}
