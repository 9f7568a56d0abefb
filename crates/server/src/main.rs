// crates/server/src/main.rs
//! Moodline server binary.
//!
//! Wires the production services (local identity, SQLite history store,
//! HTTP classifier) into the pipeline and serves the API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use moodline_server::services::{Database, HttpClassifier, LocalIdentity};
use moodline_server::{create_app, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let config = Config::from_env();

    let db = match &config.db_path {
        Some(path) => Database::new(path).await?,
        None => Database::open_default().await?,
    };

    let identity = Arc::new(LocalIdentity::new());
    let store = Arc::new(db);
    let classifier = Arc::new(HttpClassifier::new(config.classifier_url.clone()));

    let state = AppState::new(identity, store, classifier);
    let app = create_app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    eprintln!(
        "\n\u{1f4c8} moodline v{} on http://{}\n",
        env!("CARGO_PKG_VERSION"),
        addr
    );
    tracing::info!(port = config.port, classifier = %config.classifier_url, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
