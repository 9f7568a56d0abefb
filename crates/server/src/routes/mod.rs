// crates/server/src/routes/mod.rs
//! API route handlers for the moodline server.

pub mod auth;
pub mod classify;
pub mod health;
pub mod history;
pub mod view;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - POST /api/auth/signin - Establish a session
/// - POST /api/auth/signout - End the current session
/// - GET  /api/auth/session - Current session + resolving flag
/// - POST /api/classify - Classify text, persist to history best-effort
/// - GET  /api/history - Reverse-chronological history list
/// - GET  /api/history/series - Chart-ready chronological series
/// - GET  /api/view - Composite view state
/// - GET  /api/view/stream - SSE stream of view events
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", auth::router())
        .nest("/api", classify::router())
        .nest("/api", history::router())
        .nest("/api", view::router())
        .with_state(state)
}
