//! # Courier Runtime
//!
//! Runtime implementation for the Courier event pipeline.
//!
//! This crate drives the contracts defined in `courier-core` against a message backend.
//!
//! ## Core Components
//!
//! - **`TopicPublisher`**: serializes events and publishes them in one batch call
//! - **`QueueConsumer`**: long-polls a queue, decodes, dispatches to handlers and acks
//! - **`ConsumerHandle`**: observes and stops a running consumer
//! - **Metrics**: Prometheus counters and histograms for both sides
//!
//! ## Example
//!
//! ```ignore
//! use courier_runtime::{ConsumerConfig, QueueConsumer};
//! use courier_core::codec::JsonDeserializer;
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let consumer = QueueConsumer::<UserCreated>::new(sqs, ConsumerConfig::new(queue_url));
//! let handle = consumer.start(
//!     JsonDeserializer::expecting("user.created"),
//!     UserCreatedHandler,
//!     token.child_token(),
//! );
//!
//! // Later
//! token.cancel();
//! handle.stopped().await?;
//! ```

/// Queue consumer and its lifecycle handle
pub mod consumer;

/// Prometheus metrics for observability
pub mod metrics;

/// Topic publisher
pub mod publisher;

pub use consumer::{
    ConsumerConfig, ConsumerError, ConsumerHandle, ConsumerState, CycleOutcome, CycleReport,
    QueueConsumer,
};
pub use publisher::TopicPublisher;
