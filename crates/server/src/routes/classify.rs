// crates/server/src/routes/classify.rs
//! Text classification endpoint.

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use moodline_core::ClassificationOutcome;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub outcome: ClassificationOutcome,
}

/// POST /api/classify - Run one classification round trip.
///
/// Empty or whitespace-only text is rejected before any request is made.
/// Classifier failures surface as 502 with the failure message -- never a
/// silent, indefinitely-loading state. Persistence of the result is
/// best-effort and does not affect this response.
async fn classify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClassifyRequest>,
) -> ApiResult<Json<ClassifyResponse>> {
    match state.pipeline.coordinator().classify(&req.text).await? {
        Some(outcome) => Ok(Json(ClassifyResponse { outcome })),
        None => Err(ApiError::BadRequest("text must not be empty".to_string())),
    }
}

/// Create the classify routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/classify", post(classify))
}
