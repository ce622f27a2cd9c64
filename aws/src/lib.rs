//! AWS backend for the Courier event pipeline.
//!
//! This crate implements the backend client traits of `courier-core` on top of the
//! official AWS SDK:
//!
//! - [`SnsTopicClient`] implements [`TopicClient`](courier_core::backend::TopicClient)
//!   with SNS `PublishBatch`
//! - [`SqsQueueClient`] implements [`QueueClient`](courier_core::backend::QueueClient)
//!   with SQS `ReceiveMessage`, `DeleteMessage` and `DeleteMessageBatch`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  TopicPublisher  │
//! └────────┬─────────┘
//!          │ PublishBatch
//!          ▼
//! ┌──────────────────┐
//! │    SNS topic     │
//! └────────┬─────────┘
//!     ┌────┴─────┐   subscriptions (one queue per event type)
//!     ▼          ▼
//! ┌───────┐  ┌───────┐
//! │  SQS  │  │  SQS  │
//! └───┬───┘  └───┬───┘
//!     ▼          ▼
//! ┌──────────────────┐
//! │  QueueConsumer   │
//! └──────────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery**: a message is deleted only after its handler succeeded.
//! On FIFO topics the group id (aggregate id) orders events per aggregate and the
//! deduplication id (event id) drops republished duplicates.
//!
//! # Example
//!
//! ```no_run
//! use courier_aws::{AwsSettings, SnsTopicClient, SqsQueueClient, load_sdk_config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = AwsSettings::new("us-east-1")
//!     .with_endpoint("http://localhost:4566")
//!     .with_localstack(true);
//! let sdk_config = load_sdk_config(&settings).await;
//!
//! let topics = SnsTopicClient::new(&sdk_config);
//! let queues = SqsQueueClient::builder()
//!     .sdk_config(&sdk_config)
//!     .unwrap_sns_envelope(true)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod sns;
mod sqs;

pub use config::{AwsSettings, DEFAULT_REGION, load_sdk_config};
pub use sns::{SnsTopicClient, SnsTopicClientBuilder};
pub use sqs::{SqsQueueClient, SqsQueueClientBuilder};
