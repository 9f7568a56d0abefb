// crates/server/src/routes/view.rs
//! Composite view endpoints (REST + SSE).
//!
//! - `GET /api/view`        -- one-shot composite view state
//! - `GET /api/view/stream` -- SSE stream of view events

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Json, Router,
};
use moodline_core::{projector, ClassificationOutcome, Session};
use serde::Serialize;

use crate::pipeline::{ViewEvent, ViewState};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    pub resolving: bool,
    pub session: Option<Session>,
    pub loading: bool,
    pub outcome: Option<ClassificationOutcome>,
    pub history_len: usize,
}

impl From<ViewState> for ViewResponse {
    fn from(view: ViewState) -> Self {
        Self {
            resolving: view.resolving,
            session: view.session,
            loading: view.loading,
            outcome: view.outcome,
            history_len: view.snapshot.len(),
        }
    }
}

/// GET /api/view - One-shot composite view state.
async fn get_view(State(state): State<Arc<AppState>>) -> Json<ViewResponse> {
    Json(state.pipeline.view().await.into())
}

/// Event name used on the wire for a view event.
fn event_name(event: &ViewEvent) -> &'static str {
    match event {
        ViewEvent::SessionChanged { .. } => "session_changed",
        ViewEvent::SnapshotReplaced { .. } => "snapshot_replaced",
        ViewEvent::Classification { .. } => "classification",
        ViewEvent::ClassificationFailed { .. } => "classification_failed",
    }
}

fn to_sse(event: &ViewEvent) -> Event {
    Event::default()
        .event(event_name(event))
        .data(serde_json::to_string(event).unwrap_or_default())
}

/// Hydration events describing the current view, sent on connect and
/// after a lag so the client can rebuild without a separate REST call.
fn hydrate(view: &ViewState) -> Vec<Event> {
    let mut events = vec![to_sse(&ViewEvent::SessionChanged {
        session: view.session.clone(),
    })];
    events.push(to_sse(&ViewEvent::SnapshotReplaced {
        history: (*view.snapshot).clone(),
        series: projector::project(&view.snapshot),
    }));
    if let Some(outcome) = &view.outcome {
        events.push(to_sse(&ViewEvent::Classification {
            outcome: outcome.clone(),
        }));
    }
    events
}

/// GET /api/view/stream -- SSE stream of real-time view events.
///
/// # Events
///
/// | Event name              | When emitted                        |
/// |-------------------------|-------------------------------------|
/// | `session_changed`       | Identity reported a session change  |
/// | `snapshot_replaced`     | Fresh history snapshot + series     |
/// | `classification`        | A classify call produced an outcome |
/// | `classification_failed` | A classify call failed              |
/// | `heartbeat`             | Every 15 seconds to keep connection |
async fn view_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.pipeline.subscribe();
    let pipeline = state.pipeline.clone();

    let stream = async_stream::stream! {
        // 1. On connect: hydrate from the current view
        for event in hydrate(&pipeline.view().await) {
            yield Ok(event);
        }

        // 2. Stream events from the broadcast channel with heartbeat
        let mut heartbeat_interval = tokio::time::interval(Duration::from_secs(15));
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Ok(view_event) => {
                            yield Ok(to_sse(&view_event));
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(
                                "SSE client lagged by {} events, re-hydrating",
                                n
                            );
                            for event in hydrate(&pipeline.view().await) {
                                yield Ok(event);
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = heartbeat_interval.tick() => {
                    yield Ok(Event::default().event("heartbeat").data("{}"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Create the view routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/view", get(get_view))
        .route("/view/stream", get(view_stream))
}
