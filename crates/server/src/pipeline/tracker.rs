// crates/server/src/pipeline/tracker.rs
//! Identity session tracking.
//!
//! One subscription to the identity service for the lifetime of the
//! application. Each notification replaces the current session, clears
//! the `resolving` flag, and hands the session to the feed subscriber
//! when the principal actually changed.

use std::sync::Arc;

use moodline_core::Session;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{FeedSubscriber, SharedView, ViewEvent};
use crate::services::IdentityService;

pub struct SessionTracker;

impl SessionTracker {
    /// Spawn the identity subscription task. The watch receiver's
    /// current value counts as the first notification, so `resolving`
    /// clears as soon as the task starts.
    pub fn spawn(
        identity: Arc<dyn IdentityService>,
        feed: Arc<FeedSubscriber>,
        state: SharedView,
        events: broadcast::Sender<ViewEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut rx = identity.sessions();
            loop {
                let session = rx.borrow_and_update().clone();
                apply_session(&state, &events, &feed, session).await;
                if rx.changed().await.is_err() {
                    debug!("Identity stream closed, session tracker stopping");
                    break;
                }
            }
        })
    }
}

/// Apply one identity notification to the view, resubscribing the feed
/// only when the principal changed (same-user notifications must not
/// churn the store subscription).
async fn apply_session(
    state: &SharedView,
    events: &broadcast::Sender<ViewEvent>,
    feed: &Arc<FeedSubscriber>,
    session: Option<Session>,
) {
    let principal_changed = {
        let mut view = state.write().await;
        let changed = view.session.as_ref().map(|s| &s.user_id)
            != session.as_ref().map(|s| &s.user_id);
        view.resolving = false;
        view.session = session.clone();
        if session.is_none() {
            view.outcome = None;
        }
        changed
    };

    match &session {
        Some(s) => info!(user_id = %s.user_id, "Session active"),
        None => info!("Signed out"),
    }

    if principal_changed {
        feed.on_session(session.clone()).await;
    }
    let _ = events.send(ViewEvent::SessionChanged { session });
}
