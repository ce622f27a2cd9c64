//! # Courier Testing
//!
//! Testing utilities for the Courier event pipeline.
//!
//! This crate provides:
//! - [`ScriptedQueue`]: an in-memory queue answering polls from a script
//! - [`RecordingTopic`]: an in-memory topic recording every publish call
//! - [`RecordingHandler`] / [`RecordingBatchHandler`]: handlers that remember what they saw
//! - [`CountingDeserializer`]: counts decode attempts
//! - [`CapturedLogs`]: a tracing layer for asserting on structured logs
//! - [`FixedClock`]: deterministic time
//!
//! ## Example
//!
//! ```ignore
//! use courier_testing::{RecordingHandler, ScriptedQueue};
//!
//! #[tokio::test]
//! async fn acks_after_handling() {
//!     let queue = ScriptedQueue::new();
//!     queue.push_messages(vec![message("r-1", &event)]);
//!
//!     let consumer = QueueConsumer::new(Arc::new(queue.clone()), config);
//!     let report = consumer.run_single_cycle(&decoder, &RecordingHandler::new()).await;
//!
//!     assert_eq!(queue.deleted(), vec!["r-1"]);
//! }
//! ```

use chrono::{DateTime, Utc};
use courier_core::environment::Clock;

pub mod handlers;
pub mod logs;
pub mod queue;
pub mod topic;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use courier_testing::mocks::FixedClock;
    /// use courier_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use handlers::{CountingDeserializer, RecordingBatchHandler, RecordingHandler};
pub use logs::{CapturedEvent, CapturedLogs};
pub use mocks::{FixedClock, test_clock};
pub use queue::{ReceiveCall, ScriptedQueue};
pub use topic::{PublishCall, RecordingTopic};
