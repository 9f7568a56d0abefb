// crates/server/src/pipeline/coordinator.rs
//! Classification request/response cycle.
//!
//! `classify` drives one round trip to the remote classifier, installs
//! the response as the visible outcome, and fires a best-effort append
//! to the persisted log when a session exists. Overlapping calls are
//! resolved last-request-wins: each request takes a sequence number and
//! a response is only installed if no later request has already landed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moodline_core::{ClassificationOutcome, RequestError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{SharedView, ViewEvent};
use crate::services::{HistoryStore, NewEntry, TextClassifier};

pub struct ClassifyCoordinator {
    classifier: Arc<dyn TextClassifier>,
    store: Arc<dyn HistoryStore>,
    state: SharedView,
    events: broadcast::Sender<ViewEvent>,
    /// Sequence number of the most recently issued request.
    seq: AtomicU64,
}

impl ClassifyCoordinator {
    pub fn new(
        classifier: Arc<dyn TextClassifier>,
        store: Arc<dyn HistoryStore>,
        state: SharedView,
        events: broadcast::Sender<ViewEvent>,
    ) -> Self {
        Self {
            classifier,
            store,
            state,
            events,
            seq: AtomicU64::new(0),
        }
    }

    /// Classify `text`.
    ///
    /// Empty or whitespace-only input is a no-op: no request is made and
    /// the visible outcome is left untouched (`Ok(None)`).
    ///
    /// On success the outcome is installed (unless a later request
    /// already resolved) and, if a session is present, the entry is
    /// appended to the persisted log. A failed append is logged and
    /// swallowed -- the outcome stays visible regardless.
    ///
    /// On classifier failure the loading state is cleared and the error
    /// is returned so the caller can surface an explicit failed state.
    pub async fn classify(
        &self,
        text: &str,
    ) -> Result<Option<ClassificationOutcome>, RequestError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.write().await.loading = true;
        debug!(seq, provider = self.classifier.name(), "Classifying text");

        let result = match self.classifier.classify(text).await {
            Ok(result) => result,
            Err(e) => {
                self.finish(seq, None).await;
                let _ = self.events.send(ViewEvent::ClassificationFailed {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let outcome = ClassificationOutcome {
            result: result.clone(),
            seq,
        };
        let installed = self.finish(seq, Some(outcome.clone())).await;
        if installed {
            let _ = self.events.send(ViewEvent::Classification {
                outcome: outcome.clone(),
            });
        }

        // Best-effort write-back, at most once, no retry. Every
        // successful response is persisted even if a newer one owns the
        // visible outcome.
        let session = self.state.read().await.session.clone();
        if let Some(session) = session {
            let entry = NewEntry {
                text: text.to_string(),
                result,
            };
            if let Err(e) = self.store.append(&session.user_id, entry).await {
                warn!(user_id = %session.user_id, error = %e, "Failed to persist classification; result still shown");
            }
        }

        Ok(Some(outcome))
    }

    /// Settle a finished request: install the outcome unless a later
    /// request already did, and clear `loading` unless a later request
    /// is still in flight.
    async fn finish(&self, seq: u64, outcome: Option<ClassificationOutcome>) -> bool {
        let mut view = self.state.write().await;
        let superseded = view.outcome.as_ref().is_some_and(|o| o.seq > seq);
        let installed = match outcome {
            Some(outcome) if !superseded => {
                view.outcome = Some(outcome);
                true
            }
            _ => false,
        };
        if self.seq.load(Ordering::SeqCst) == seq {
            view.loading = false;
        }
        installed
    }
}
