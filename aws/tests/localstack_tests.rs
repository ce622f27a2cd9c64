//! End-to-end tests against LocalStack.
//!
//! These tests create a topic, a queue and a subscription, publish through
//! [`SnsTopicClient`] and consume through [`SqsQueueClient`].
//!
//! # Running These Tests
//!
//! They are marked `#[ignore]` because they need LocalStack with SNS and SQS enabled:
//! ```bash
//! docker run --rm -p 4566:4566 localstack/localstack
//! cargo test -p courier-aws --test localstack_tests -- --ignored
//! ```
//!
//! `AWS_ENDPOINT` overrides the default endpoint `http://localhost:4566`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use aws_config::SdkConfig;
use aws_sdk_sqs::types::QueueAttributeName;
use chrono::{DateTime, Utc};
use courier_aws::{AwsSettings, SnsTopicClient, SqsQueueClient, load_sdk_config};
use courier_core::codec::JsonDeserializer;
use courier_core::event::{Event, EventMetadata};
use courier_core::publish::Publisher;
use courier_runtime::{ConsumerConfig, QueueConsumer, TopicPublisher};
use courier_testing::RecordingHandler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Ping {
    #[serde(flatten)]
    metadata: EventMetadata,
    source_id: String,
}

impl Event for Ping {
    fn event_type(&self) -> &str {
        &self.metadata.event_type
    }
    fn event_id(&self) -> &str {
        &self.metadata.event_id
    }
    fn aggregate_id(&self) -> &str {
        &self.source_id
    }
    fn timestamp(&self) -> DateTime<Utc> {
        self.metadata.timestamp
    }
}

async fn sdk_config() -> SdkConfig {
    let endpoint =
        std::env::var("AWS_ENDPOINT").unwrap_or_else(|_| "http://localhost:4566".to_string());
    load_sdk_config(
        &AwsSettings::default()
            .with_endpoint(endpoint)
            .with_localstack(true),
    )
    .await
}

/// Create a standard topic and a queue subscribed to it, returning (topic ARN, queue URL).
async fn topic_with_queue(config: &SdkConfig, name: &str) -> anyhow::Result<(String, String)> {
    let sns = aws_sdk_sns::Client::new(config);
    let sqs = aws_sdk_sqs::Client::new(config);

    let topic_arn = sns
        .create_topic()
        .name(name)
        .send()
        .await?
        .topic_arn()
        .map(str::to_string)
        .expect("topic ARN");

    let queue_url = sqs
        .create_queue()
        .queue_name(name)
        .send()
        .await?
        .queue_url()
        .map(str::to_string)
        .expect("queue URL");

    let queue_arn = sqs
        .get_queue_attributes()
        .queue_url(&queue_url)
        .attribute_names(QueueAttributeName::QueueArn)
        .send()
        .await?
        .attributes()
        .and_then(|attributes| attributes.get(&QueueAttributeName::QueueArn))
        .cloned()
        .expect("queue ARN");

    sns.subscribe()
        .topic_arn(&topic_arn)
        .protocol("sqs")
        .endpoint(queue_arn)
        .send()
        .await?;

    Ok((topic_arn, queue_url))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
#[ignore = "Requires LocalStack to be running"]
async fn published_event_is_consumed_from_a_subscribed_queue() -> anyhow::Result<()> {
    let config = sdk_config().await;
    let name = format!("courier-it-{}", Utc::now().timestamp_millis());
    let (topic_arn, queue_url) = topic_with_queue(&config, &name).await?;

    let topics = SnsTopicClient::builder()
        .sdk_config(&config)
        .fifo(false)
        .build()?;
    let publisher = TopicPublisher::new(Arc::new(topics), topic_arn);

    let event = Ping {
        metadata: EventMetadata::new("ping"),
        source_id: "source-1".to_string(),
    };
    publisher.publish(&event).await?;

    let queues = SqsQueueClient::builder()
        .sdk_config(&config)
        .unwrap_sns_envelope(true)
        .build()?;
    let consumer = QueueConsumer::<Ping>::new(
        Arc::new(queues),
        ConsumerConfig::new(queue_url).with_poll_wait_time(Duration::from_secs(5)),
    );
    let handler = RecordingHandler::new();
    let decoder = JsonDeserializer::<Ping>::expecting("ping");

    for _ in 0..6 {
        if consumer.run_single_cycle(&decoder, &handler).await.acked > 0 {
            break;
        }
    }

    assert_eq!(handler.handled(), vec![event]);
    Ok(())
}
