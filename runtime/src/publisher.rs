//! Topic publisher.
//!
//! [`TopicPublisher`] implements [`Publisher`] on top of any [`TopicClient`]:
//!
//! 1. Serialize every event of the batch. If one fails, return that error and send
//!    nothing.
//! 2. Build one entry per event: body, deduplication id = event id, group id =
//!    aggregate id, `event_type` attribute = event type.
//! 3. Send all entries in one backend call.
//! 4. Log every entry the backend rejected and return
//!    [`PublishError::PartialBatch`] if there was at least one.
//!
//! # Example
//!
//! ```ignore
//! use courier_runtime::TopicPublisher;
//!
//! let publisher = TopicPublisher::new(Arc::new(sns_client), topic_arn);
//! publisher.publish(&event).await?;
//! ```

use crate::metrics::PublisherMetrics;
use courier_core::backend::{PublishEntry, TopicClient};
use courier_core::codec::{JsonSerializer, Serializer};
use courier_core::event::Event;
use courier_core::publish::{PublishError, Publisher};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Span};

/// Message attribute carrying the event type.
pub const EVENT_TYPE_ATTRIBUTE: &str = "event_type";

/// Publishes events to one topic through a [`TopicClient`].
///
/// All log lines are emitted inside the publisher's span (field `topic`), created when
/// the publisher is constructed, or supplied with [`with_span`](Self::with_span).
pub struct TopicPublisher<S = JsonSerializer> {
    client: Arc<dyn TopicClient>,
    topic: String,
    serializer: S,
    span: Span,
    metrics: PublisherMetrics,
}

impl TopicPublisher<JsonSerializer> {
    /// Create a JSON publisher for `topic`.
    #[must_use]
    pub fn new(client: Arc<dyn TopicClient>, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            client,
            span: tracing::info_span!("publisher", topic = %topic),
            metrics: PublisherMetrics::new(topic.clone()),
            topic,
            serializer: JsonSerializer,
        }
    }
}

impl<S> TopicPublisher<S> {
    /// Replace the serializer.
    #[must_use]
    pub fn with_serializer<S2>(self, serializer: S2) -> TopicPublisher<S2> {
        TopicPublisher {
            client: self.client,
            topic: self.topic,
            serializer,
            span: self.span,
            metrics: self.metrics,
        }
    }

    /// Log inside `span` instead of the default one.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The topic this publisher sends to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn entries<E>(&self, events: &[E]) -> Result<Vec<PublishEntry>, PublishError>
    where
        E: Event,
        S: Serializer<E>,
    {
        events
            .iter()
            .map(|event| {
                let body = self.serializer.serialize(event).map_err(|source| {
                    PublishError::Serialization {
                        event_id: event.event_id().to_string(),
                        event_type: event.event_type().to_string(),
                        aggregate_id: event.aggregate_id().to_string(),
                        source,
                    }
                })?;

                Ok(PublishEntry {
                    id: event.event_id().to_string(),
                    body,
                    group_id: event.aggregate_id().to_string(),
                    deduplication_id: event.event_id().to_string(),
                    attributes: BTreeMap::from([(
                        EVENT_TYPE_ATTRIBUTE.to_string(),
                        event.event_type().to_string(),
                    )]),
                })
            })
            .collect()
    }
}

impl<S> std::fmt::Debug for TopicPublisher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicPublisher")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl<E, S> Publisher<E> for TopicPublisher<S>
where
    E: Event,
    S: Serializer<E>,
{
    fn publish_batch<'a>(&'a self, events: &'a [E]) -> BoxFuture<'a, Result<(), PublishError>> {
        Box::pin(
            async move {
                if events.is_empty() {
                    tracing::debug!("Empty batch, nothing to publish");
                    return Ok(());
                }

                let entries = match self.entries(events) {
                    Ok(entries) => entries,
                    Err(err) => {
                        self.metrics.record_error();
                        tracing::error!(error = %err, "Failed to serialize batch, nothing sent");
                        return Err(err);
                    }
                };

                let event_types: BTreeSet<&str> =
                    events.iter().map(Event::event_type).collect();
                tracing::info!(
                    batch_size = events.len(),
                    event_types = ?event_types,
                    "Publishing events"
                );

                let start = Instant::now();
                let output = match self.client.publish_batch(&self.topic, entries).await {
                    Ok(output) => output,
                    Err(err) => {
                        self.metrics.record_error();
                        tracing::error!(error = %err, "Failed to publish events");
                        return Err(err.into());
                    }
                };
                self.metrics
                    .record_batch(output.successful.len(), output.failed.len(), start.elapsed());

                if output.failed.is_empty() {
                    tracing::debug!(published = output.successful.len(), "Published events");
                    return Ok(());
                }

                for failed in &output.failed {
                    tracing::error!(
                        message_id = %failed.id,
                        code = %failed.code,
                        error = failed.message.as_deref().unwrap_or("unknown error"),
                        "Failed to publish event"
                    );
                }

                Err(PublishError::PartialBatch {
                    failed: output.failed.len(),
                    total: events.len(),
                    failed_ids: output.failed.into_iter().map(|failed| failed.id).collect(),
                })
            }
            .instrument(self.span.clone()),
        )
    }
}
