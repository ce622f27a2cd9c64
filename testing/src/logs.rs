//! Log capture for assertions on structured logging.
//!
//! [`CapturedLogs`] is a `tracing_subscriber` layer that stores every event together
//! with its fields and the fields of the spans it was emitted in. Install it for the
//! current thread with [`CapturedLogs::set_default`]; no global subscriber is touched,
//! so tests stay isolated from each other.
//!
//! ```
//! use courier_testing::CapturedLogs;
//!
//! let logs = CapturedLogs::new();
//! {
//!     let _guard = logs.set_default();
//!     let span = tracing::info_span!("consumer", queue = "orders");
//!     let _entered = span.enter();
//!     tracing::warn!(receipt_handle = "r-1", "Failed to acknowledge message");
//! }
//!
//! let warnings = logs.at_level(tracing::Level::WARN);
//! assert_eq!(warnings.len(), 1);
//! assert_eq!(warnings[0].field("receipt_handle"), Some("r-1"));
//! assert_eq!(warnings[0].field("queue"), Some("orders"));
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// One captured log event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Event level
    pub level: Level,
    /// Event target (module path)
    pub target: String,
    /// The formatted message
    pub message: String,
    /// Fields recorded on the event itself
    pub fields: BTreeMap<String, String>,
    /// Fields of the enclosing spans, outermost first, inner spans overriding
    pub span_fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// Look up a field on the event, falling back to its enclosing spans.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .or_else(|| self.span_fields.get(name))
            .map(String::as_str)
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }
}

struct SpanFields(BTreeMap<String, String>);

/// Layer capturing log events in memory.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// Create an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a subscriber with this layer as the default for the current thread.
    ///
    /// The subscriber stays active until the returned guard is dropped. Tasks spawned
    /// with `WithSubscriber::with_current_subscriber` keep logging into it from other
    /// threads.
    #[must_use = "the subscriber is uninstalled when the guard is dropped"]
    pub fn set_default(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    /// Every captured event, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captured events of exactly `level`.
    #[must_use]
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == level)
            .cloned()
            .collect()
    }

    /// Captured events whose message contains `needle`.
    #[must_use]
    pub fn with_message(&self, needle: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.message.contains(needle))
            .cloned()
            .collect()
    }

    /// Forget everything captured so far.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl std::fmt::Debug for CapturedLogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedLogs")
            .field("events", &self.events.lock().unwrap().len())
            .finish()
    }
}

impl<S> Layer<S> for CapturedLogs
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(visitor.fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut span_fields = BTreeMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    span_fields.extend(fields.0.clone());
                }
            }
        }

        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
            span_fields,
        });
    }
}
