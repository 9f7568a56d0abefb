// crates/server/src/pipeline/feed.rs
//! Live history feed subscription, keyed on the session identity.
//!
//! At most one store subscription is live at any time: every session
//! change bumps a generation counter and aborts the previous feed task
//! before the next subscription opens. Emissions carry their generation
//! and are dropped if a newer one has been issued, so a late callback
//! from a superseded session can never overwrite current state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moodline_core::{projector, HistorySnapshot, Session};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{SharedView, ViewEvent};
use crate::services::HistoryStore;

pub struct FeedSubscriber {
    store: Arc<dyn HistoryStore>,
    state: SharedView,
    events: broadcast::Sender<ViewEvent>,
    /// Bumped on every session change; emissions from older generations
    /// are ignored.
    generation: AtomicU64,
    /// The currently live subscription task, if any.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FeedSubscriber {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        state: SharedView,
        events: broadcast::Sender<ViewEvent>,
    ) -> Self {
        Self {
            store,
            state,
            events,
            generation: AtomicU64::new(0),
            task: Mutex::new(None),
        }
    }

    /// Handle a session transition: unsubscribe-before-resubscribe.
    ///
    /// The snapshot is cleared on every transition, so a user switch
    /// never shows the previous user's history while the new feed warms
    /// up, and a sign-out leaves the history empty.
    pub async fn on_session(self: &Arc<Self>, session: Option<Session>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }

        self.publish(Vec::new(), generation).await;

        let Some(session) = session else {
            return;
        };

        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.run(session.user_id, generation).await;
        });
        *self.task.lock().await = Some(handle);
    }

    /// One subscription's lifetime: open the stream, then forward every
    /// snapshot that still belongs to the current generation.
    async fn run(self: Arc<Self>, user_id: String, generation: u64) {
        let mut stream = match self.store.subscribe_ordered(&user_id).await {
            Ok(stream) => stream,
            Err(e) => {
                // Degrade to an empty history view, never crash.
                warn!(user_id = %user_id, error = %e, "History subscription failed");
                return;
            }
        };

        while let Some(snapshot) = stream.next().await {
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(user_id = %user_id, "Dropping snapshot from superseded subscription");
                break;
            }
            self.publish(snapshot, generation).await;
        }
        debug!(user_id = %user_id, "History feed ended");
    }

    /// Replace the cached snapshot wholesale and broadcast it with its
    /// projected series. The generation is re-checked under the write
    /// lock so an abort racing with an in-flight publish cannot land a
    /// stale snapshot after the clear.
    async fn publish(&self, snapshot: HistorySnapshot, generation: u64) {
        let series = projector::project(&snapshot);
        let shared = Arc::new(snapshot);
        {
            let mut view = self.state.write().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            view.snapshot = shared.clone();
        }
        let _ = self.events.send(ViewEvent::SnapshotReplaced {
            history: (*shared).clone(),
            series,
        });
    }

    /// Abort the live subscription task (process teardown).
    pub async fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }
}
