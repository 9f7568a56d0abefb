// crates/server/src/routes/auth.rs
//! Sign-in / sign-out endpoints.
//!
//! Thin shims over the identity service. A failed operation leaves the
//! current session untouched; the session change itself reaches clients
//! through the identity stream, not through these responses.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use moodline_core::Session;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    /// Optional display name; the provider picks a default otherwise.
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// True only before the first identity notification.
    pub resolving: bool,
    pub session: Option<Session>,
}

/// POST /api/auth/signin - Establish a session.
async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Json<Session>> {
    let session = state.identity.sign_in(req.display_name).await?;
    Ok(Json(session))
}

/// POST /api/auth/signout - End the current session.
async fn sign_out(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    state.identity.sign_out().await?;
    Ok(Json(serde_json::json!({ "signedOut": true })))
}

/// GET /api/auth/session - Current session and the resolving flag.
async fn current_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let view = state.pipeline.view().await;
    Json(SessionResponse {
        resolving: view.resolving,
        session: view.session,
    })
}

/// Create the auth routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signin", post(sign_in))
        .route("/auth/signout", post(sign_out))
        .route("/auth/session", get(current_session))
}
