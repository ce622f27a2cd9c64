//! In-memory topic that records every publish call.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use courier_core::backend::{
    BackendError, FailedEntry, PublishBatchOutput, PublishEntry, TopicClient,
};
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A recorded `publish_batch` call.
#[derive(Clone, Debug)]
pub struct PublishCall {
    /// Topic the batch was sent to
    pub topic: String,
    /// Entries of the batch, in order
    pub entries: Vec<PublishEntry>,
}

#[derive(Default)]
struct State {
    calls: Vec<PublishCall>,
    rejections: HashMap<String, String>,
    call_failures: VecDeque<BackendError>,
}

/// Recording in-memory [`TopicClient`].
///
/// Entries are accepted unless their id was registered with
/// [`reject`](Self::reject); whole calls can be failed with
/// [`fail_next_call`](Self::fail_next_call).
#[derive(Clone, Default)]
pub struct RecordingTopic {
    state: Arc<Mutex<State>>,
}

impl RecordingTopic {
    /// Create a topic that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the entry with `entry_id` as rejected with `code`.
    pub fn reject(&self, entry_id: impl Into<String>, code: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .rejections
            .insert(entry_id.into(), code.into());
    }

    /// Fail the next `publish_batch` call as a whole.
    pub fn fail_next_call(&self, error: BackendError) {
        self.state.lock().unwrap().call_failures.push_back(error);
    }

    /// Every call received so far, including failed ones.
    #[must_use]
    pub fn calls(&self) -> Vec<PublishCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Bodies of every accepted entry, decoded as UTF-8 JSON.
    #[must_use]
    pub fn accepted_bodies(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .calls
            .iter()
            .flat_map(|call| call.entries.iter())
            .filter(|entry| !state.rejections.contains_key(&entry.id))
            .map(|entry| String::from_utf8_lossy(&entry.body).into_owned())
            .collect()
    }

    /// The `event_type` attribute of every accepted entry.
    #[must_use]
    pub fn accepted_event_types(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .calls
            .iter()
            .flat_map(|call| call.entries.iter())
            .filter(|entry| !state.rejections.contains_key(&entry.id))
            .filter_map(|entry| entry.attributes.get("event_type").cloned())
            .collect()
    }
}

impl std::fmt::Debug for RecordingTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingTopic")
            .field("calls", &self.call_count())
            .finish()
    }
}

impl TopicClient for RecordingTopic {
    fn publish_batch<'a>(
        &'a self,
        topic: &'a str,
        entries: Vec<PublishEntry>,
    ) -> BoxFuture<'a, Result<PublishBatchOutput, BackendError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let mut output = PublishBatchOutput::default();
            for entry in &entries {
                match state.rejections.get(&entry.id) {
                    Some(code) => output.failed.push(FailedEntry::new(
                        entry.id.clone(),
                        code.clone(),
                        Some(format!("entry {} rejected", entry.id)),
                    )),
                    None => output.successful.push(entry.id.clone()),
                }
            }
            state.calls.push(PublishCall {
                topic: topic.to_string(),
                entries,
            });

            match state.call_failures.pop_front() {
                Some(error) => Err(error),
                None => Ok(output),
            }
        })
    }
}
