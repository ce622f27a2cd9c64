//! SNS topic client.

use aws_config::SdkConfig;
use aws_sdk_sns::error::{BuildError, DisplayErrorContext};
use aws_sdk_sns::types::{MessageAttributeValue, PublishBatchRequestEntry};
use courier_core::backend::{
    BackendError, FailedEntry, PublishBatchOutput, PublishEntry, TopicClient,
};
use futures::future::BoxFuture;

/// [`TopicClient`] backed by SNS `PublishBatch`.
///
/// On FIFO topics (the default) every entry carries its group id and deduplication id.
/// Standard topics reject those fields, so set [`fifo(false)`](SnsTopicClientBuilder::fifo)
/// for them.
///
/// # Example
///
/// ```no_run
/// use courier_aws::{AwsSettings, SnsTopicClient, load_sdk_config};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sdk_config = load_sdk_config(&AwsSettings::default()).await;
///
/// // FIFO topic
/// let fifo = SnsTopicClient::new(&sdk_config);
///
/// // Standard topic
/// let standard = SnsTopicClient::builder()
///     .sdk_config(&sdk_config)
///     .fifo(false)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SnsTopicClient {
    client: aws_sdk_sns::Client,
    fifo: bool,
}

impl SnsTopicClient {
    /// Create a FIFO topic client from an SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sns::Client::new(config),
            fifo: true,
        }
    }

    /// Create a new builder for configuring the client.
    #[must_use]
    pub fn builder() -> SnsTopicClientBuilder {
        SnsTopicClientBuilder::default()
    }

    /// Whether entries carry group and deduplication ids.
    #[must_use]
    pub const fn is_fifo(&self) -> bool {
        self.fifo
    }
}

/// Builder for configuring an [`SnsTopicClient`].
#[derive(Default)]
pub struct SnsTopicClientBuilder {
    client: Option<aws_sdk_sns::Client>,
    fifo: Option<bool>,
}

impl SnsTopicClientBuilder {
    /// Build the SDK client from `config`.
    #[must_use]
    pub fn sdk_config(mut self, config: &SdkConfig) -> Self {
        self.client = Some(aws_sdk_sns::Client::new(config));
        self
    }

    /// Use an existing SDK client.
    #[must_use]
    pub fn client(mut self, client: aws_sdk_sns::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Whether the topic is a FIFO topic.
    ///
    /// Default: `true`
    #[must_use]
    pub const fn fifo(mut self, fifo: bool) -> Self {
        self.fifo = Some(fifo);
        self
    }

    /// Build the [`SnsTopicClient`].
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ConnectionFailed`] if neither an SDK configuration nor a
    /// client was provided.
    pub fn build(self) -> Result<SnsTopicClient, BackendError> {
        let client = self.client.ok_or_else(|| {
            BackendError::ConnectionFailed("SNS client not configured".to_string())
        })?;
        let fifo = self.fifo.unwrap_or(true);

        tracing::info!(fifo, "SnsTopicClient created");

        Ok(SnsTopicClient { client, fifo })
    }
}

fn invalid_request(err: &BuildError) -> BackendError {
    BackendError::InvalidRequest(err.to_string())
}

/// Convert one entry to its SNS representation.
fn request_entry(entry: PublishEntry, fifo: bool) -> Result<PublishBatchRequestEntry, BackendError> {
    let message = String::from_utf8(entry.body).map_err(|e| {
        BackendError::InvalidRequest(format!("body of entry '{}' is not UTF-8: {e}", entry.id))
    })?;

    let mut builder = PublishBatchRequestEntry::builder()
        .id(entry.id)
        .message(message);

    if fifo {
        builder = builder
            .message_group_id(entry.group_id)
            .message_deduplication_id(entry.deduplication_id);
    }

    for (name, value) in entry.attributes {
        let attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .map_err(|e| invalid_request(&e))?;
        builder = builder.message_attributes(name, attribute);
    }

    builder.build().map_err(|e| invalid_request(&e))
}

impl TopicClient for SnsTopicClient {
    fn publish_batch<'a>(
        &'a self,
        topic: &'a str,
        entries: Vec<PublishEntry>,
    ) -> BoxFuture<'a, Result<PublishBatchOutput, BackendError>> {
        Box::pin(async move {
            let entries = entries
                .into_iter()
                .map(|entry| request_entry(entry, self.fifo))
                .collect::<Result<Vec<_>, _>>()?;

            let output = self
                .client
                .publish_batch()
                .topic_arn(topic)
                .set_publish_batch_request_entries(Some(entries))
                .send()
                .await
                .map_err(|err| BackendError::PublishFailed {
                    topic: topic.to_string(),
                    reason: DisplayErrorContext(&err).to_string(),
                })?;

            let result = PublishBatchOutput {
                successful: output
                    .successful()
                    .iter()
                    .filter_map(|entry| entry.id().map(str::to_string))
                    .collect(),
                failed: output
                    .failed()
                    .iter()
                    .map(|entry| {
                        FailedEntry::new(entry.id(), entry.code(), entry.message().map(str::to_string))
                    })
                    .collect(),
            };

            tracing::trace!(
                topic,
                successful = result.successful.len(),
                failed = result.failed.len(),
                "PublishBatch completed"
            );
            Ok(result)
        })
    }
}
