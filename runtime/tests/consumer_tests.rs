//! Behaviour tests for [`QueueConsumer`] against a scripted in-memory queue.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::{DateTime, Utc};
use courier_core::backend::{BackendError, ReceivedMessage};
use courier_core::codec::{Deserializer, JsonDeserializer};
use courier_core::event::{Event, EventError, EventMetadata};
use courier_core::handler::{batch_handler_fn, handler_fn};
use courier_runtime::{
    ConsumerConfig, ConsumerError, ConsumerState, CycleOutcome, CycleReport, QueueConsumer,
};
use courier_testing::{
    CapturedLogs, CountingDeserializer, RecordingBatchHandler, RecordingHandler, ScriptedQueue,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;

// ============================================================================
// Test Fixtures
// ============================================================================

const QUEUE: &str = "orders";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct OrderPlaced {
    #[serde(flatten)]
    metadata: EventMetadata,
    order_id: String,
}

impl Event for OrderPlaced {
    fn event_type(&self) -> &str {
        &self.metadata.event_type
    }
    fn event_id(&self) -> &str {
        &self.metadata.event_id
    }
    fn aggregate_id(&self) -> &str {
        &self.order_id
    }
    fn timestamp(&self) -> DateTime<Utc> {
        self.metadata.timestamp
    }
}

fn order(order_id: &str) -> OrderPlaced {
    OrderPlaced {
        metadata: EventMetadata::new("order.placed"),
        order_id: order_id.to_string(),
    }
}

/// Message `n` carries `order-n` and receipt handle `r-n`.
fn message(n: usize) -> ReceivedMessage {
    let body = serde_json::to_vec(&order(&format!("order-{n}"))).unwrap();
    ReceivedMessage::new(format!("m-{n}"), body, format!("r-{n}"))
}

fn garbage(n: usize) -> ReceivedMessage {
    ReceivedMessage::new(format!("m-{n}"), b"not json".to_vec(), format!("r-{n}"))
}

fn config() -> ConsumerConfig {
    ConsumerConfig::new(QUEUE).with_poll_wait_time(Duration::from_millis(10))
}

fn consumer(queue: &ScriptedQueue, config: ConsumerConfig) -> QueueConsumer<OrderPlaced> {
    QueueConsumer::new(Arc::new(queue.clone()), config)
}

fn decoder() -> JsonDeserializer<OrderPlaced> {
    JsonDeserializer::expecting("order.placed")
}

fn order_ids(events: &[OrderPlaced]) -> Vec<&str> {
    events.iter().map(|event| event.order_id.as_str()).collect()
}

/// Poll `condition` until it holds, advancing tokio time in small steps.
async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

// ============================================================================
// Single-item cycles
// ============================================================================

#[tokio::test]
async fn single_cycle_handles_and_acks_every_message_in_order() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2), message(3)]);
    let handler = RecordingHandler::new();

    let report = consumer(&queue, config())
        .run_single_cycle(&decoder(), &handler)
        .await;

    assert_eq!(
        report,
        CycleReport {
            received: 3,
            handled: 3,
            acked: 3,
            outcome: CycleOutcome::Completed,
        }
    );
    assert_eq!(order_ids(&handler.handled()), vec!["order-1", "order-2", "order-3"]);
    assert_eq!(queue.deleted(), vec!["r-1", "r-2", "r-3"]);
}

#[tokio::test]
async fn handler_failure_leaves_the_failing_message_and_the_rest_unacked() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2), message(3)]);
    let handler = RecordingHandler::new().fail_when(|event: &OrderPlaced| event.order_id == "order-2");

    let report = consumer(&queue, config())
        .run_single_cycle(&decoder(), &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::HandlerFailed { index: 1 });
    assert_eq!(report.handled, 1);
    assert_eq!(report.acked, 1);
    assert_eq!(queue.deleted(), vec!["r-1"]);
    assert_eq!(queue.delete_calls(), 1);
    // Message 3 is never attempted
    assert_eq!(order_ids(&handler.attempts()), vec!["order-1", "order-2"]);
}

#[tokio::test]
async fn decode_failure_stops_the_cycle() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), garbage(2), message(3)]);
    let handler = RecordingHandler::new();

    let report = consumer(&queue, config())
        .run_single_cycle(&decoder(), &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::DecodeFailed { index: 1 });
    assert_eq!(handler.calls(), 1);
    assert_eq!(queue.deleted(), vec!["r-1"]);
}

#[tokio::test]
async fn unexpected_event_type_counts_as_a_decode_failure() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1)]);
    let handler = RecordingHandler::new();
    let decoder = JsonDeserializer::<OrderPlaced>::expecting("order.cancelled");

    let report = consumer(&queue, config())
        .run_single_cycle(&decoder, &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::DecodeFailed { index: 0 });
    assert_eq!(handler.calls(), 0);
    assert_eq!(queue.delete_calls(), 0);
}

#[tokio::test]
async fn ack_failure_stops_the_cycle() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2)]);
    queue.fail_delete("r-1");
    let handler = RecordingHandler::new();

    let report = consumer(&queue, config())
        .run_single_cycle(&decoder(), &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::AckFailed { index: 0 });
    assert_eq!(report.handled, 1);
    assert_eq!(report.acked, 0);
    assert_eq!(handler.calls(), 1);
    assert_eq!(queue.delete_calls(), 1);
    assert!(queue.deleted().is_empty());
}

#[tokio::test]
async fn empty_poll_does_no_work() {
    let queue = ScriptedQueue::new();
    queue.push_empty();
    let decoder = CountingDeserializer::new(decoder());
    let handler = RecordingHandler::new();

    let report = consumer(&queue, config())
        .run_single_cycle(&decoder, &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::Empty);
    assert_eq!(decoder.calls(), 0);
    assert_eq!(handler.calls(), 0);
    assert_eq!(queue.delete_calls(), 0);
}

#[tokio::test]
async fn failed_poll_does_no_work() {
    let queue = ScriptedQueue::new();
    queue.push_error(BackendError::ReceiveFailed {
        queue: QUEUE.to_string(),
        reason: "throttled".to_string(),
    });
    let decoder = CountingDeserializer::new(decoder());
    let handler = RecordingHandler::new();

    let report = consumer(&queue, config())
        .run_single_cycle(&decoder, &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::PollFailed);
    assert_eq!(decoder.calls(), 0);
    assert_eq!(handler.calls(), 0);
    assert_eq!(queue.delete_calls(), 0);
}

#[tokio::test]
async fn poll_uses_the_configured_request() {
    let queue = ScriptedQueue::new();
    queue.push_empty();
    let config = config()
        .with_max_batch_size(1)
        .with_visibility_window(Duration::from_secs(45));

    consumer(&queue, config)
        .run_single_cycle(&decoder(), &RecordingHandler::new())
        .await;

    let request = &queue.receives()[0].request;
    assert_eq!(request.queue, QUEUE);
    assert_eq!(request.max_messages, 1);
    assert_eq!(request.visibility_timeout, Duration::from_secs(45));
    assert_eq!(request.wait_time, Duration::from_millis(10));
}

#[tokio::test]
async fn handler_failure_is_logged_with_queue_and_message_id() {
    let logs = CapturedLogs::new();
    let _guard = logs.set_default();

    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1)]);
    let handler = RecordingHandler::new().fail_when(|_: &OrderPlaced| true);

    consumer(&queue, config())
        .run_single_cycle(&decoder(), &handler)
        .await;

    let failures = logs.with_message("Handler failed");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].level, Level::ERROR);
    assert_eq!(failures[0].field("queue"), Some(QUEUE));
    assert_eq!(failures[0].field("message_id"), Some("m-1"));
    assert!(failures[0].field("error").unwrap().contains("handler rejected event"));
}

#[tokio::test]
async fn panicking_handler_counts_as_a_handler_failure() {
    let logs = CapturedLogs::new();
    let _guard = logs.set_default();

    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2)]);
    let handler = handler_fn(|event: OrderPlaced| async move {
        if event.order_id == "order-2" {
            panic!("inventory lookup exploded");
        }
        anyhow::Ok(())
    });

    let report = consumer(&queue, config())
        .run_single_cycle(&decoder(), &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::HandlerFailed { index: 1 });
    assert_eq!(report.acked, 1);
    assert_eq!(queue.deleted(), vec!["r-1"]);

    let failures = logs.with_message("Handler failed, leaving message for redelivery");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].field("message_id"), Some("m-2"));
    assert!(failures[0].field("error").unwrap().contains("inventory lookup exploded"));
}

/// Panics on every payload.
struct ExplodingDeserializer;

impl Deserializer<OrderPlaced> for ExplodingDeserializer {
    fn deserialize(&self, _bytes: &[u8]) -> Result<OrderPlaced, EventError> {
        panic!("decoder bug");
    }
}

#[tokio::test]
async fn panicking_deserializer_counts_as_a_decode_failure() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1)]);
    let handler = RecordingHandler::new();

    let report = consumer(&queue, config())
        .run_single_cycle(&ExplodingDeserializer, &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::DecodeFailed { index: 0 });
    assert_eq!(handler.calls(), 0);
    assert_eq!(queue.delete_calls(), 0);
}

// ============================================================================
// Batch cycles
// ============================================================================

#[tokio::test]
async fn batch_cycle_hands_over_all_events_then_acks_each() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2)]);
    let handler = RecordingBatchHandler::new();

    let report = consumer(&queue, config())
        .run_batch_cycle(&decoder(), &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(report.acked, 2);
    let batches = handler.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(order_ids(&batches[0]), vec!["order-1", "order-2"]);
    assert_eq!(queue.deleted(), vec!["r-1", "r-2"]);
}

#[tokio::test]
async fn batch_handler_failure_acks_nothing() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2)]);
    let handler = RecordingBatchHandler::failing();

    let report = consumer(&queue, config())
        .run_batch_cycle(&decoder(), &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::HandlerFailed { index: 0 });
    assert_eq!(report.handled, 0);
    assert_eq!(handler.batches().len(), 1);
    assert_eq!(queue.delete_calls(), 0);
}

#[tokio::test]
async fn batch_decode_failure_skips_the_handler() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), garbage(2)]);
    let handler = RecordingBatchHandler::new();

    let report = consumer(&queue, config())
        .run_batch_cycle(&decoder(), &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::DecodeFailed { index: 1 });
    assert!(handler.batches().is_empty());
    assert_eq!(queue.delete_calls(), 0);
}

#[tokio::test]
async fn one_failed_ack_does_not_block_the_others_in_batch_mode() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2), message(3)]);
    queue.fail_delete("r-2");

    let report = consumer(&queue, config())
        .run_batch_cycle(&decoder(), &RecordingBatchHandler::new())
        .await;

    assert_eq!(report.outcome, CycleOutcome::AckFailed { index: 1 });
    assert_eq!(report.handled, 3);
    assert_eq!(report.acked, 2);
    assert_eq!(queue.delete_calls(), 3);
    assert_eq!(queue.deleted(), vec!["r-1", "r-3"]);
}

#[tokio::test]
async fn panicking_batch_handler_acks_nothing() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2)]);
    let handler = batch_handler_fn(|events: Vec<OrderPlaced>| async move {
        assert!(events.is_empty(), "bulk insert exploded");
        anyhow::Ok(())
    });

    let report = consumer(&queue, config())
        .run_batch_cycle(&decoder(), &handler)
        .await;

    assert_eq!(report.outcome, CycleOutcome::HandlerFailed { index: 0 });
    assert_eq!(report.handled, 0);
    assert!(queue.deleted().is_empty());
}

// ============================================================================
// Acknowledgement
// ============================================================================

#[tokio::test]
async fn ack_failure_is_returned_and_logged() {
    let logs = CapturedLogs::new();
    let _guard = logs.set_default();

    let queue = ScriptedQueue::new();
    queue.fail_delete("r-9");

    let err = consumer(&queue, config()).ack("r-9").await.unwrap_err();

    assert!(matches!(err, ConsumerError::Ack(_)));
    let failures = logs.with_message("Failed to acknowledge message");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].field("receipt_handle"), Some("r-9"));
}

#[tokio::test]
async fn batch_ack_sends_one_entry_per_receipt() {
    let queue = ScriptedQueue::new();
    let receipts = vec!["r-1".to_string(), "r-2".to_string()];

    consumer(&queue, config()).batch_ack(&receipts).await.unwrap();

    let batches = queue.delete_batches();
    assert_eq!(batches.len(), 1);
    let ids: Vec<&str> = batches[0].iter().map(|entry| entry.id.as_str()).collect();
    let handles: Vec<&str> = batches[0]
        .iter()
        .map(|entry| entry.receipt_handle.as_str())
        .collect();
    assert_eq!(ids, vec!["r-1", "r-2"]);
    assert_eq!(handles, vec!["r-1", "r-2"]);
}

#[tokio::test]
async fn batch_ack_reports_rejected_entries() {
    let queue = ScriptedQueue::new();
    queue.fail_delete("r-2");
    let receipts = vec!["r-1".to_string(), "r-2".to_string(), "r-3".to_string()];

    let err = consumer(&queue, config())
        .batch_ack(&receipts)
        .await
        .unwrap_err();

    match err {
        ConsumerError::PartialAck { failed, failed_ids } => {
            assert_eq!(failed, 1);
            assert_eq!(failed_ids, vec!["r-2".to_string()]);
        }
        other => panic!("expected PartialAck, got {other:?}"),
    }
    assert_eq!(queue.deleted(), vec!["r-1", "r-3"]);
}

#[tokio::test]
async fn batch_ack_of_nothing_makes_no_call() {
    let queue = ScriptedQueue::new();

    consumer(&queue, config()).batch_ack(&[]).await.unwrap();

    assert!(queue.delete_batches().is_empty());
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn out_of_range_settings_are_clamped_with_a_warning() {
    let logs = CapturedLogs::new();
    let _guard = logs.set_default();

    let oversized = consumer(
        &ScriptedQueue::new(),
        ConsumerConfig::new(QUEUE)
            .with_max_batch_size(25)
            .with_poll_wait_time(Duration::from_secs(60)),
    );
    assert_eq!(oversized.config().max_batch_size, 10);
    assert_eq!(oversized.config().poll_wait_time, Duration::from_secs(20));

    let zero = consumer(&ScriptedQueue::new(), ConsumerConfig::new(QUEUE).with_max_batch_size(0));
    assert_eq!(zero.config().max_batch_size, 1);

    assert_eq!(logs.at_level(Level::WARN).len(), 3);
}

#[test]
fn in_range_settings_are_kept() {
    let config = ConsumerConfig::new(QUEUE)
        .with_max_batch_size(5)
        .with_poll_wait_time(Duration::from_secs(20));

    assert_eq!(config.clone().normalized(), config);
}

// ============================================================================
// Poll loop lifecycle
// ============================================================================

#[tokio::test]
async fn new_consumer_is_created_and_started_consumer_is_running() {
    let queue = ScriptedQueue::new();
    let consumer = consumer(&queue, config());
    assert_eq!(consumer.state(), ConsumerState::Created);

    let token = CancellationToken::new();
    let handle = consumer.start(decoder(), RecordingHandler::new(), token.clone());
    assert_eq!(handle.state(), ConsumerState::Running);
    assert_eq!(handle.queue(), QUEUE);

    token.cancel();
    handle.stopped().await.unwrap();
}

#[tokio::test]
async fn started_consumer_processes_messages_until_cancelled() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2)]);
    queue.push_messages(vec![message(3)]);
    let handler = RecordingHandler::new();
    let token = CancellationToken::new();

    let handle = consumer(&queue, config()).start(decoder(), handler.clone(), token.clone());
    eventually(|| queue.deleted().len() == 3).await;

    token.cancel();
    eventually(|| handle.is_finished()).await;
    assert_eq!(handle.state(), ConsumerState::Stopped);
    handle.stopped().await.unwrap();

    assert_eq!(order_ids(&handler.handled()), vec!["order-1", "order-2", "order-3"]);
}

#[tokio::test]
async fn batch_loop_processes_messages() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1), message(2)]);
    let handler = RecordingBatchHandler::new();
    let token = CancellationToken::new();

    let handle =
        consumer(&queue, config()).start_batch(decoder(), handler.clone(), token.clone());
    eventually(|| queue.deleted().len() == 2).await;

    handle.shutdown();
    handle.stopped().await.unwrap();
    assert_eq!(handler.batches().len(), 1);
}

#[tokio::test]
async fn cancelled_before_start_polls_at_most_once() {
    let queue = ScriptedQueue::new();
    let token = CancellationToken::new();
    token.cancel();

    let handle = consumer(&queue, config()).start(decoder(), RecordingHandler::new(), token);
    eventually(|| handle.is_finished()).await;

    assert_eq!(handle.state(), ConsumerState::Stopped);
    handle.stopped().await.unwrap();
    assert!(queue.receive_count() <= 1);
}

#[tokio::test]
async fn handle_reports_stopped_after_exit() {
    let queue = ScriptedQueue::new();
    let token = CancellationToken::new();

    let handle = consumer(&queue, config()).start(decoder(), RecordingHandler::new(), token.clone());
    queue.wait_for_receives(1).await;

    token.cancel();
    eventually(|| handle.is_finished()).await;

    assert_eq!(handle.state(), ConsumerState::Stopped);
}

#[tokio::test]
async fn handler_panic_does_not_end_the_poll_loop() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1)]);
    queue.push_messages(vec![message(2)]);
    let token = CancellationToken::new();
    let handler = handler_fn(|event: OrderPlaced| async move {
        if event.order_id == "order-1" {
            panic!("inventory lookup exploded");
        }
        anyhow::Ok(())
    });

    let handle = consumer(&queue, config()).start(decoder(), handler, token.clone());
    eventually(|| queue.deleted() == ["r-2"]).await;

    assert!(!handle.is_finished());
    assert_eq!(handle.state(), ConsumerState::Running);

    token.cancel();
    eventually(|| handle.is_finished()).await;
    assert_eq!(handle.state(), ConsumerState::Stopped);
    handle.stopped().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancellation_lets_the_running_handler_finish_and_ack() {
    let queue = ScriptedQueue::new();
    queue.push_messages(vec![message(1)]);
    let started = Arc::new(AtomicBool::new(false));
    let token = CancellationToken::new();
    let handler = handler_fn({
        let started = Arc::clone(&started);
        move |_event: OrderPlaced| {
            let started = Arc::clone(&started);
            async move {
                started.store(true, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                anyhow::Ok(())
            }
        }
    });

    let handle = consumer(&queue, config()).start(decoder(), handler, token.clone());
    eventually(|| started.load(Ordering::SeqCst)).await;

    token.cancel();
    eventually(|| handle.state() == ConsumerState::Stopping).await;
    assert!(queue.deleted().is_empty());

    eventually(|| handle.is_finished()).await;
    assert_eq!(handle.state(), ConsumerState::Stopped);
    handle.stopped().await.unwrap();

    assert_eq!(queue.deleted(), vec!["r-1"]);
    assert_eq!(queue.receive_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_polls_back_off_and_never_reach_the_handler() {
    let queue = ScriptedQueue::new();
    queue.fail_when_exhausted(BackendError::ConnectionFailed("queue unreachable".to_string()));
    let decoder = CountingDeserializer::new(decoder());
    let decode_calls = decoder.counter();
    let handler = RecordingHandler::new();
    let token = CancellationToken::new();

    let handle = consumer(&queue, config().with_error_backoff(Duration::from_secs(1)))
        .start(decoder, handler.clone(), token.clone());
    queue.wait_for_receives(4).await;

    token.cancel();
    handle.stopped().await.unwrap();

    let receives = queue.receives();
    for pair in receives.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_secs(1));
    }
    assert_eq!(decode_calls.load(Ordering::SeqCst), 0);
    assert_eq!(handler.calls(), 0);
    assert_eq!(queue.delete_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_backoff() {
    let queue = ScriptedQueue::new();
    queue.fail_when_exhausted(BackendError::ConnectionFailed("queue unreachable".to_string()));
    let token = CancellationToken::new();

    let handle = consumer(&queue, config().with_error_backoff(Duration::from_secs(3_600)))
        .start(decoder(), RecordingHandler::new(), token.clone());
    queue.wait_for_receives(1).await;

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle.stopped())
        .await
        .expect("consumer should stop without waiting out the backoff")
        .unwrap();

    assert_eq!(queue.receive_count(), 1);
}

#[tokio::test]
async fn shutdown_within_stops_an_idle_consumer() {
    let queue = ScriptedQueue::new();
    let handle = consumer(&queue, config()).start(
        decoder(),
        RecordingHandler::new(),
        CancellationToken::new(),
    );
    queue.wait_for_receives(1).await;

    handle
        .shutdown_within(Duration::from_secs(5))
        .await
        .unwrap();
}

#[tokio::test]
async fn lifecycle_is_logged_in_the_consumer_span() {
    let logs = CapturedLogs::new();
    let _guard = logs.set_default();

    let queue = ScriptedQueue::new();
    let token = CancellationToken::new();
    let handle = consumer(&queue, config()).start(decoder(), RecordingHandler::new(), token.clone());
    queue.wait_for_receives(1).await;
    token.cancel();
    handle.stopped().await.unwrap();

    let started = logs.with_message("Consumer started");
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].field("queue"), Some(QUEUE));
    assert_eq!(started[0].field("mode"), Some("single"));

    let stopped = logs.with_message("Consumer stopped");
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0].field("queue"), Some(QUEUE));
}
