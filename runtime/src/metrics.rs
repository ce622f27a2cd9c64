//! Pipeline metrics and their Prometheus exporter.
//!
//! [`PublisherMetrics`] and [`ConsumerMetrics`] record through the `metrics` facade, so
//! nothing is exported until a recorder is installed. The worker installs one with
//! [`MetricsServer::serve`]; tests can use [`install_recorder`] and render in-process.
//!
//! ```rust,no_run
//! use courier_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! MetricsServer::new("0.0.0.0:9090".parse()?).serve()?;
//! // Scrape http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Failures installing the exporter.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The exporter configuration was rejected
    #[error("Invalid metrics exporter configuration: {0}")]
    Build(String),
    /// The recorder or HTTP listener could not be installed
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Serves the pipeline metrics over HTTP for Prometheus scraping.
#[derive(Clone, Copy, Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    /// Exporter listening on `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// The listen address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Install the global recorder and start the HTTP listener on the current Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a recorder is already installed or the
    /// listener cannot bind.
    pub fn serve(self) -> Result<(), MetricsError> {
        describe_metrics();

        builder()?
            .with_http_listener(self.addr)
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        tracing::info!(addr = %self.addr, "Serving metrics at http://{}/metrics", self.addr);
        Ok(())
    }
}

/// Install the global recorder without an HTTP listener.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    describe_metrics();

    builder()?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))
}

fn builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        // Latency buckets, in seconds
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))
}

fn describe_metrics() {
    // Publisher Metrics
    describe_counter!(
        "publisher_events_published_total",
        "Total number of events accepted by the backend"
    );
    describe_counter!(
        "publisher_events_rejected_total",
        "Total number of events rejected by the backend in otherwise successful batches"
    );
    describe_counter!(
        "publisher_errors_total",
        "Total number of failed publish calls (serialization or backend)"
    );
    describe_histogram!(
        "publisher_batch_duration_seconds",
        "Time taken by one batch publish call"
    );

    // Consumer Metrics
    describe_counter!(
        "consumer_messages_received_total",
        "Total number of messages received from a queue"
    );
    describe_counter!(
        "consumer_messages_handled_total",
        "Total number of messages successfully handled"
    );
    describe_counter!(
        "consumer_messages_acked_total",
        "Total number of messages deleted from a queue"
    );
    describe_counter!(
        "consumer_poll_errors_total",
        "Total number of failed polls"
    );
    describe_counter!(
        "consumer_decode_errors_total",
        "Total number of messages that failed to deserialize"
    );
    describe_counter!(
        "consumer_handler_errors_total",
        "Total number of handler failures"
    );
    describe_counter!(
        "consumer_ack_errors_total",
        "Total number of failed message deletions"
    );
}

/// Publisher metrics recorder, labelled by topic.
#[derive(Clone, Debug)]
pub struct PublisherMetrics {
    topic: String,
}

impl PublisherMetrics {
    /// Create a recorder for `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    /// Record the outcome of a batch that reached the backend.
    pub fn record_batch(&self, published: usize, rejected: usize, duration: Duration) {
        counter!("publisher_events_published_total", "topic" => self.topic.clone())
            .increment(published as u64);
        if rejected > 0 {
            counter!("publisher_events_rejected_total", "topic" => self.topic.clone())
                .increment(rejected as u64);
        }
        histogram!("publisher_batch_duration_seconds", "topic" => self.topic.clone())
            .record(duration.as_secs_f64());
    }

    /// Record a failed publish call.
    pub fn record_error(&self) {
        counter!("publisher_errors_total", "topic" => self.topic.clone()).increment(1);
    }
}

/// Consumer metrics recorder, labelled by queue.
#[derive(Clone, Debug)]
pub struct ConsumerMetrics {
    queue: String,
}

impl ConsumerMetrics {
    /// Create a recorder for `queue`.
    #[must_use]
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
        }
    }

    /// Record messages returned by a poll.
    pub fn record_received(&self, count: usize) {
        counter!("consumer_messages_received_total", "queue" => self.queue.clone())
            .increment(count as u64);
    }

    /// Record messages handled successfully.
    pub fn record_handled(&self, count: usize) {
        counter!("consumer_messages_handled_total", "queue" => self.queue.clone())
            .increment(count as u64);
    }

    /// Record messages deleted.
    pub fn record_acked(&self, count: usize) {
        counter!("consumer_messages_acked_total", "queue" => self.queue.clone())
            .increment(count as u64);
    }

    /// Record a failed poll.
    pub fn record_poll_error(&self) {
        counter!("consumer_poll_errors_total", "queue" => self.queue.clone()).increment(1);
    }

    /// Record a message that failed to deserialize.
    pub fn record_decode_error(&self) {
        counter!("consumer_decode_errors_total", "queue" => self.queue.clone()).increment(1);
    }

    /// Record a handler failure.
    pub fn record_handler_error(&self) {
        counter!("consumer_handler_errors_total", "queue" => self.queue.clone()).increment(1);
    }

    /// Record failed deletions.
    pub fn record_ack_errors(&self, count: usize) {
        counter!("consumer_ack_errors_total", "queue" => self.queue.clone())
            .increment(count as u64);
    }
}
