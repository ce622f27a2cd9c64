//! SQS queue client.

use aws_config::SdkConfig;
use aws_sdk_sqs::error::{BuildError, DisplayErrorContext};
use aws_sdk_sqs::types::{
    BatchResultErrorEntry, DeleteMessageBatchRequestEntry, DeleteMessageBatchResultEntry, Message,
};
use courier_core::backend::{
    BackendError, DeleteBatchOutput, DeleteEntry, FailedEntry, QueueClient, ReceiveRequest,
    ReceivedMessage,
};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Most entries SQS accepts in one `DeleteMessageBatch` request.
const MAX_DELETE_BATCH: usize = 10;
/// Entry error code recorded for every entry of a chunk whose request failed.
const CHUNK_REQUEST_FAILED: &str = "RequestFailed";

/// [`QueueClient`] backed by SQS.
///
/// When the queue is subscribed to an SNS topic without raw message delivery, every body
/// is an SNS notification envelope. [`unwrap_sns_envelope(true)`](SqsQueueClientBuilder::unwrap_sns_envelope)
/// replaces such bodies by the published message and lifts the envelope's message
/// attributes onto the received message.
#[derive(Clone, Debug)]
pub struct SqsQueueClient {
    client: aws_sdk_sqs::Client,
    unwrap_sns_envelope: bool,
}

impl SqsQueueClient {
    /// Create a client from an SDK configuration. Bodies are passed through unchanged.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sqs::Client::new(config),
            unwrap_sns_envelope: false,
        }
    }

    /// Create a new builder for configuring the client.
    #[must_use]
    pub fn builder() -> SqsQueueClientBuilder {
        SqsQueueClientBuilder::default()
    }

    fn convert(&self, queue: &str, message: &Message) -> Option<ReceivedMessage> {
        let message_id = message.message_id().unwrap_or_default();
        let Some(receipt_handle) = message.receipt_handle() else {
            tracing::warn!(queue, message_id, "Skipping message without receipt handle");
            return None;
        };

        let mut body = message.body().unwrap_or_default().to_string();
        let mut attributes: HashMap<String, String> = message
            .message_attributes()
            .into_iter()
            .flatten()
            .filter_map(|(name, value)| {
                value
                    .string_value()
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect();

        if self.unwrap_sns_envelope {
            if let Some(notification) = SnsNotification::parse(&body) {
                for (name, attribute) in notification.message_attributes {
                    attributes.entry(name).or_insert(attribute.value);
                }
                body = notification.message;
            }
        }

        let mut received = ReceivedMessage::new(message_id, body.into_bytes(), receipt_handle);
        received.attributes = attributes;
        Some(received)
    }
}

/// Builder for configuring an [`SqsQueueClient`].
#[derive(Default)]
pub struct SqsQueueClientBuilder {
    client: Option<aws_sdk_sqs::Client>,
    unwrap_sns_envelope: Option<bool>,
}

impl SqsQueueClientBuilder {
    /// Build the SDK client from `config`.
    #[must_use]
    pub fn sdk_config(mut self, config: &SdkConfig) -> Self {
        self.client = Some(aws_sdk_sqs::Client::new(config));
        self
    }

    /// Use an existing SDK client.
    #[must_use]
    pub fn client(mut self, client: aws_sdk_sqs::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Replace SNS notification envelopes by the message they carry.
    ///
    /// Default: `false` (raw message delivery)
    #[must_use]
    pub const fn unwrap_sns_envelope(mut self, unwrap: bool) -> Self {
        self.unwrap_sns_envelope = Some(unwrap);
        self
    }

    /// Build the [`SqsQueueClient`].
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ConnectionFailed`] if neither an SDK configuration nor a
    /// client was provided.
    pub fn build(self) -> Result<SqsQueueClient, BackendError> {
        let client = self.client.ok_or_else(|| {
            BackendError::ConnectionFailed("SQS client not configured".to_string())
        })?;
        let unwrap_sns_envelope = self.unwrap_sns_envelope.unwrap_or(false);

        tracing::info!(unwrap_sns_envelope, "SqsQueueClient created");

        Ok(SqsQueueClient {
            client,
            unwrap_sns_envelope,
        })
    }
}

/// The parts of an SNS notification envelope the consumer needs.
#[derive(Deserialize)]
struct SnsNotification {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Message")]
    message: String,
    #[serde(rename = "MessageAttributes", default)]
    message_attributes: HashMap<String, EnvelopeAttribute>,
}

#[derive(Deserialize)]
struct EnvelopeAttribute {
    #[serde(rename = "Value")]
    value: String,
}

impl SnsNotification {
    fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|notification| notification.kind == "Notification")
    }
}

fn invalid_request(err: &BuildError) -> BackendError {
    BackendError::InvalidRequest(err.to_string())
}

fn as_i32(value: u64, what: &str) -> Result<i32, BackendError> {
    i32::try_from(value)
        .map_err(|_| BackendError::InvalidRequest(format!("{what} out of range: {value}")))
}

fn whole_seconds(duration: Duration, what: &str) -> Result<i32, BackendError> {
    as_i32(duration.as_secs(), what)
}

/// Map a positional wire id back to the caller's entry id.
fn caller_id(entries: &[DeleteEntry], wire_id: &str) -> String {
    wire_id
        .parse::<usize>()
        .ok()
        .and_then(|index| entries.get(index))
        .map_or_else(|| wire_id.to_string(), |entry| entry.id.clone())
}

/// Record the per-entry results of one chunk's `DeleteMessageBatch` response.
fn record_chunk_results(
    result: &mut DeleteBatchOutput,
    chunk: &[DeleteEntry],
    successful: &[DeleteMessageBatchResultEntry],
    failed: &[BatchResultErrorEntry],
) {
    result
        .successful
        .extend(successful.iter().map(|entry| caller_id(chunk, entry.id())));
    result.failed.extend(failed.iter().map(|entry| {
        FailedEntry::new(
            caller_id(chunk, entry.id()),
            entry.code(),
            entry.message().map(str::to_string),
        )
    }));
}

/// Mark every entry of a chunk whose request failed as a whole.
fn record_chunk_failure(result: &mut DeleteBatchOutput, chunk: &[DeleteEntry], reason: &str) {
    result.failed.extend(
        chunk
            .iter()
            .map(|entry| {
                FailedEntry::new(&entry.id, CHUNK_REQUEST_FAILED, Some(reason.to_string()))
            }),
    );
}

impl QueueClient for SqsQueueClient {
    fn receive(
        &self,
        request: ReceiveRequest,
    ) -> BoxFuture<'_, Result<Vec<ReceivedMessage>, BackendError>> {
        Box::pin(async move {
            let output = self
                .client
                .receive_message()
                .queue_url(&request.queue)
                .max_number_of_messages(as_i32(
                    u64::from(request.max_messages),
                    "max_messages",
                )?)
                .visibility_timeout(whole_seconds(request.visibility_timeout, "visibility_timeout")?)
                .wait_time_seconds(whole_seconds(request.wait_time, "wait_time")?)
                .message_attribute_names("All")
                .send()
                .await
                .map_err(|err| BackendError::ReceiveFailed {
                    queue: request.queue.clone(),
                    reason: DisplayErrorContext(&err).to_string(),
                })?;

            Ok(output
                .messages()
                .iter()
                .filter_map(|message| self.convert(&request.queue, message))
                .collect())
        })
    }

    fn delete<'a>(
        &'a self,
        queue: &'a str,
        receipt_handle: &'a str,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            self.client
                .delete_message()
                .queue_url(queue)
                .receipt_handle(receipt_handle)
                .send()
                .await
                .map_err(|err| BackendError::DeleteFailed {
                    queue: queue.to_string(),
                    reason: DisplayErrorContext(&err).to_string(),
                })?;
            Ok(())
        })
    }

    fn delete_batch<'a>(
        &'a self,
        queue: &'a str,
        entries: Vec<DeleteEntry>,
    ) -> BoxFuture<'a, Result<DeleteBatchOutput, BackendError>> {
        Box::pin(async move {
            let mut result = DeleteBatchOutput::default();
            let mut first_error = None;
            let mut any_sent = false;

            // Wire ids are chunk positions: SQS only allows up to 80 alphanumeric, '-' or '_'
            for chunk in entries.chunks(MAX_DELETE_BATCH) {
                let wire_entries = chunk
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| {
                        DeleteMessageBatchRequestEntry::builder()
                            .id(index.to_string())
                            .receipt_handle(&entry.receipt_handle)
                            .build()
                            .map_err(|e| invalid_request(&e))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                match self
                    .client
                    .delete_message_batch()
                    .queue_url(queue)
                    .set_entries(Some(wire_entries))
                    .send()
                    .await
                {
                    Ok(output) => {
                        any_sent = true;
                        record_chunk_results(
                            &mut result,
                            chunk,
                            output.successful(),
                            output.failed(),
                        );
                    }
                    Err(err) => {
                        let reason = DisplayErrorContext(&err).to_string();
                        tracing::warn!(
                            queue,
                            entries = chunk.len(),
                            error = %reason,
                            "Delete batch request failed"
                        );
                        record_chunk_failure(&mut result, chunk, &reason);
                        first_error.get_or_insert(BackendError::DeleteFailed {
                            queue: queue.to_string(),
                            reason,
                        });
                    }
                }
            }

            // Only a call where no chunk went through fails as a whole
            match first_error {
                Some(err) if !any_sent => Err(err),
                _ => Ok(result),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: a failing test
mod tests {
    use super::*;
    use aws_config::{BehaviorVersion, Region};
    use aws_sdk_sqs::types::MessageAttributeValue;

    fn client(unwrap_sns_envelope: bool) -> SqsQueueClient {
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        SqsQueueClient::builder()
            .client(aws_sdk_sqs::Client::from_conf(config))
            .unwrap_sns_envelope(unwrap_sns_envelope)
            .build()
            .unwrap()
    }

    const ENVELOPE: &str = r#"{
        "Type": "Notification",
        "MessageId": "sns-1",
        "TopicArn": "arn:aws:sns:us-east-1:000000000000:events",
        "Message": "{\"event_type\":\"user.created\"}",
        "MessageAttributes": {
            "event_type": {"Type": "String", "Value": "user.created"}
        }
    }"#;

    fn message(body: &str) -> Message {
        Message::builder()
            .message_id("m-1")
            .receipt_handle("r-1")
            .body(body)
            .build()
    }

    #[test]
    fn raw_bodies_pass_through() {
        let received = client(false).convert("q", &message(ENVELOPE)).unwrap();

        assert_eq!(received.message_id, "m-1");
        assert_eq!(received.receipt_handle, "r-1");
        assert_eq!(received.body, ENVELOPE.as_bytes());
    }

    #[test]
    fn sns_envelope_is_unwrapped_with_its_attributes() {
        let received = client(true).convert("q", &message(ENVELOPE)).unwrap();

        assert_eq!(received.body, br#"{"event_type":"user.created"}"#);
        assert_eq!(
            received.attributes.get("event_type").map(String::as_str),
            Some("user.created")
        );
    }

    #[test]
    fn non_envelope_body_is_kept_when_unwrapping() {
        let body = r#"{"event_type":"user.created"}"#;
        let received = client(true).convert("q", &message(body)).unwrap();

        assert_eq!(received.body, body.as_bytes());
    }

    #[test]
    fn sqs_message_attributes_are_copied() {
        let message = Message::builder()
            .message_id("m-1")
            .receipt_handle("r-1")
            .body("{}")
            .message_attributes(
                "event_type",
                MessageAttributeValue::builder()
                    .data_type("String")
                    .string_value("user.deleted")
                    .build()
                    .unwrap(),
            )
            .build();

        let received = client(false).convert("q", &message).unwrap();

        assert_eq!(
            received.attributes.get("event_type").map(String::as_str),
            Some("user.deleted")
        );
    }

    #[test]
    fn message_without_receipt_handle_is_skipped() {
        let message = Message::builder().message_id("m-1").body("{}").build();

        assert!(client(false).convert("q", &message).is_none());
    }

    #[test]
    fn wire_ids_map_back_to_caller_ids() {
        let entries = vec![
            DeleteEntry {
                id: "AQEB+receipt/one==".to_string(),
                receipt_handle: "AQEB+receipt/one==".to_string(),
            },
            DeleteEntry {
                id: "second".to_string(),
                receipt_handle: "r-2".to_string(),
            },
        ];

        assert_eq!(caller_id(&entries, "0"), "AQEB+receipt/one==");
        assert_eq!(caller_id(&entries, "1"), "second");
        assert_eq!(caller_id(&entries, "7"), "7");
        assert_eq!(caller_id(&entries, "not-a-position"), "not-a-position");
    }

    fn delete_entries(count: usize) -> Vec<DeleteEntry> {
        (0..count)
            .map(|n| DeleteEntry {
                id: format!("receipt-{n}"),
                receipt_handle: format!("receipt-{n}"),
            })
            .collect()
    }

    #[test]
    fn chunk_results_keep_caller_ids() {
        let entries = delete_entries(2);
        let mut result = DeleteBatchOutput::default();

        record_chunk_results(
            &mut result,
            &entries,
            &[DeleteMessageBatchResultEntry::builder().id("0").build().unwrap()],
            &[BatchResultErrorEntry::builder()
                .id("1")
                .code("ReceiptHandleIsInvalid")
                .sender_fault(true)
                .message("expired")
                .build()
                .unwrap()],
        );

        assert_eq!(result.successful, vec!["receipt-0"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].id, "receipt-1");
        assert_eq!(result.failed[0].code, "ReceiptHandleIsInvalid");
        assert_eq!(result.failed[0].message.as_deref(), Some("expired"));
    }

    #[test]
    fn failed_later_chunk_keeps_earlier_deletes() {
        let entries = delete_entries(12);
        let mut chunks = entries.chunks(MAX_DELETE_BATCH);
        let (first, second) = (chunks.next().unwrap(), chunks.next().unwrap());
        let deleted: Vec<_> = (0..first.len())
            .map(|index| {
                DeleteMessageBatchResultEntry::builder()
                    .id(index.to_string())
                    .build()
                    .unwrap()
            })
            .collect();
        let mut result = DeleteBatchOutput::default();

        record_chunk_results(&mut result, first, &deleted, &[]);
        record_chunk_failure(&mut result, second, "connection reset");

        assert_eq!(result.successful.len(), 10);
        assert_eq!(result.successful[9], "receipt-9");
        let failed: Vec<_> = result.failed.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(failed, vec!["receipt-10", "receipt-11"]);
        assert!(result.failed.iter().all(|entry| {
            entry.code == CHUNK_REQUEST_FAILED
                && entry.message.as_deref() == Some("connection reset")
        }));
    }

    #[test]
    fn durations_are_sent_in_whole_seconds() {
        assert_eq!(whole_seconds(Duration::from_millis(20_900), "wait_time").unwrap(), 20);
        assert!(matches!(
            whole_seconds(Duration::from_secs(u64::MAX), "wait_time"),
            Err(BackendError::InvalidRequest(_))
        ));
    }

    #[test]
    fn builder_requires_a_client() {
        assert!(matches!(
            SqsQueueClient::builder().build(),
            Err(BackendError::ConnectionFailed(_))
        ));
    }
}
