// crates/server/src/lib.rs
//! Moodline server library.
//!
//! An Axum HTTP server around the state-synchronization pipeline: it
//! exposes sign-in/out, text classification, the per-user history, and a
//! live SSE view stream.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, auth, classify, history, view)
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Database, HttpClassifier, LocalIdentity};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    /// App wired to a local identity, an in-memory store, and a
    /// classifier endpoint that is never reachable (these tests never
    /// classify successfully).
    async fn test_app() -> Router {
        let identity = Arc::new(LocalIdentity::new());
        let store = Arc::new(Database::new_in_memory().await.expect("in-memory DB"));
        let classifier = Arc::new(HttpClassifier::new("http://127.0.0.1:1/analyze"));
        create_app(AppState::new(identity, store, classifier))
    }

    /// Helper to make a request and collect the response.
    async fn request(app: Router, req: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        request(
            app,
            Request::builder().uri(uri).body(Body::empty()).unwrap(),
        )
        .await
    }

    async fn post_json(app: Router, uri: &str, json: &str) -> (StatusCode, String) {
        request(
            app,
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
        )
        .await
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_app().await;
        let (status, body) = get(app, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""));
        assert!(body.contains("\"uptime_secs\""));
    }

    #[tokio::test]
    async fn test_classify_rejects_empty_text() {
        let app = test_app().await;
        let (status, body) = post_json(app, "/api/classify", r#"{"text":"   "}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("must not be empty"));
    }

    #[tokio::test]
    async fn test_classify_unreachable_classifier_is_502() {
        let app = test_app().await;
        let (status, body) = post_json(app, "/api/classify", r#"{"text":"hello"}"#).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("Classification failed"));
    }

    #[tokio::test]
    async fn test_sign_in_returns_session() {
        let app = test_app().await;
        let (status, body) =
            post_json(app, "/api/auth/signin", r#"{"displayName":"Ada"}"#).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["displayName"], "Ada");
        assert!(json["userId"].as_str().unwrap().starts_with("local-"));
    }

    #[tokio::test]
    async fn test_session_endpoint_reports_signed_out() {
        let app = test_app().await;
        // Give the tracker a chance to consume the initial identity value.
        tokio::task::yield_now().await;
        let (status, body) = get(app, "/api/auth/session").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["session"].is_null());
    }

    #[tokio::test]
    async fn test_history_starts_empty() {
        let app = test_app().await;
        let (status, body) = get(app, "/api/history").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["total"], 0);
    }

    #[tokio::test]
    async fn test_series_of_empty_history() {
        let app = test_app().await;
        let (status, body) = get(app, "/api/history/series").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["labels"].as_array().unwrap().is_empty());
        assert!(json["values"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_404_for_unknown_route() {
        let app = test_app().await;
        let (status, _body) = get(app, "/api/nonexistent").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("Origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let allow_origin = response.headers().get("access-control-allow-origin");
        assert!(allow_origin.is_some());
        assert_eq!(allow_origin.unwrap(), "*");
    }
}
