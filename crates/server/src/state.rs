// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use crate::pipeline::Pipeline;
use crate::services::{HistoryStore, IdentityService, TextClassifier};

/// Shared application state accessible from all route handlers.
///
/// Service handles are injected (no module-level globals), so tests can
/// substitute fakes for any collaborator.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Identity provider -- sign-in/out and the session change stream.
    pub identity: Arc<dyn IdentityService>,
    /// The running state-synchronization pipeline.
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Wire the pipeline to the given services and wrap everything in an
    /// Arc for sharing.
    pub fn new(
        identity: Arc<dyn IdentityService>,
        store: Arc<dyn HistoryStore>,
        classifier: Arc<dyn TextClassifier>,
    ) -> Arc<Self> {
        let pipeline = Pipeline::start(identity.clone(), store, classifier);
        Arc::new(Self {
            start_time: Instant::now(),
            identity,
            pipeline,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
