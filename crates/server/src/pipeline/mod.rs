// crates/server/src/pipeline/mod.rs
//! The state-synchronization pipeline.
//!
//! Reconciles three independently-arriving sources -- identity changes,
//! the live history feed, and one-off classification responses -- into a
//! single [`ViewState`], and broadcasts every change as a [`ViewEvent`]
//! for SSE clients.

pub mod coordinator;
pub mod feed;
pub mod tracker;

pub use coordinator::ClassifyCoordinator;
pub use feed::FeedSubscriber;
pub use tracker::SessionTracker;

use std::sync::Arc;

use moodline_core::{ChartSeries, ClassificationOutcome, HistorySnapshot, Session};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::services::{HistoryStore, IdentityService, TextClassifier};

/// Capacity of the view-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The single consistent view derived from all three sources.
///
/// Mutated only by the pipeline components; route handlers read clones.
/// The snapshot is held behind an `Arc` and swapped wholesale, so a
/// reader never observes a partially-updated sequence.
#[derive(Debug, Clone)]
pub struct ViewState {
    /// True only before the first identity notification arrives. Gates
    /// rendering so clients never flicker between signed-out and
    /// signed-in.
    pub resolving: bool,
    /// Current session, or `None` when signed out.
    pub session: Option<Session>,
    /// True while a classify request is in flight.
    pub loading: bool,
    /// Most recent classify outcome, independent of the persisted
    /// history. Cleared when the session goes away.
    pub outcome: Option<ClassificationOutcome>,
    /// Cached ordered history for the active session.
    pub snapshot: Arc<HistorySnapshot>,
}

impl ViewState {
    fn new() -> Self {
        Self {
            resolving: true,
            session: None,
            loading: false,
            outcome: None,
            snapshot: Arc::new(Vec::new()),
        }
    }
}

/// Shared handle to the view state.
pub type SharedView = Arc<RwLock<ViewState>>;

/// Events broadcast to connected SSE clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewEvent {
    /// The identity provider reported a session change.
    SessionChanged { session: Option<Session> },
    /// The history feed delivered a fresh snapshot.
    SnapshotReplaced {
        history: HistorySnapshot,
        series: ChartSeries,
    },
    /// A classify call produced a visible outcome.
    Classification { outcome: ClassificationOutcome },
    /// A classify call failed; `message` is safe to show the user.
    ClassificationFailed { message: String },
}

/// Assembled pipeline: one session tracker, one feed subscriber, one
/// classify coordinator, all sharing the same view state and event
/// channel.
pub struct Pipeline {
    state: SharedView,
    events: broadcast::Sender<ViewEvent>,
    coordinator: Arc<ClassifyCoordinator>,
    feed: Arc<FeedSubscriber>,
    tracker: JoinHandle<()>,
}

impl Pipeline {
    /// Wire the components to the injected services and start the
    /// identity subscription.
    pub fn start(
        identity: Arc<dyn IdentityService>,
        store: Arc<dyn HistoryStore>,
        classifier: Arc<dyn TextClassifier>,
    ) -> Arc<Self> {
        let state: SharedView = Arc::new(RwLock::new(ViewState::new()));
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let feed = Arc::new(FeedSubscriber::new(
            store.clone(),
            state.clone(),
            events.clone(),
        ));
        let coordinator = Arc::new(ClassifyCoordinator::new(
            classifier,
            store,
            state.clone(),
            events.clone(),
        ));
        let tracker = SessionTracker::spawn(identity, feed.clone(), state.clone(), events.clone());

        Arc::new(Self {
            state,
            events,
            coordinator,
            feed,
            tracker,
        })
    }

    /// Subscribe to view events for SSE streaming.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current composite view.
    pub async fn view(&self) -> ViewState {
        self.state.read().await.clone()
    }

    pub fn coordinator(&self) -> &ClassifyCoordinator {
        &self.coordinator
    }

    /// Tear down both live subscriptions (process teardown).
    pub async fn shutdown(&self) {
        self.tracker.abort();
        self.feed.teardown().await;
    }
}
