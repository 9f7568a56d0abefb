// crates/server/src/routes/history.rs
//! History list and chart series endpoints.
//!
//! Both read the pipeline's cached snapshot -- they never query the store
//! directly. The list is reverse-chronological (most recent first); the
//! chart series keeps the feed's chronological order.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use moodline_core::{projector, ChartSeries, HistoryEntry};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Most recent entry first.
    pub entries: Vec<HistoryEntry>,
    pub total: usize,
}

/// GET /api/history - Reverse-chronological display list.
async fn list_history(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    let view = state.pipeline.view().await;
    let mut entries: Vec<HistoryEntry> = (*view.snapshot).clone();
    entries.reverse();
    let total = entries.len();
    Json(HistoryResponse { entries, total })
}

/// GET /api/history/series - Chart-ready series in chronological order.
async fn history_series(State(state): State<Arc<AppState>>) -> Json<ChartSeries> {
    let view = state.pipeline.view().await;
    Json(projector::project(&view.snapshot))
}

/// Create the history routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/history", get(list_history))
        .route("/history/series", get(history_series))
}
