// crates/server/src/services/mod.rs
//! External collaborator boundaries: identity, history store, classifier.
//!
//! The pipeline only ever sees these traits. Production wiring injects
//! [`LocalIdentity`], [`Database`], and [`HttpClassifier`]; tests inject
//! scripted fakes.

pub mod classifier;
pub mod db;
pub mod identity;

pub use classifier::HttpClassifier;
pub use db::Database;
pub use identity::LocalIdentity;

use async_trait::async_trait;
use moodline_core::{
    AuthError, HistorySnapshot, LabelScore, RequestError, Session, SubscriptionError, WriteError,
};
use tokio::sync::{mpsc, watch};

/// A classification ready to be appended to a user's history log.
///
/// The store assigns the id and the creation timestamp.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub text: String,
    pub result: Vec<LabelScore>,
}

/// The identity provider, treated as an opaque service.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Establish a session. `display_name` defaults to a provider-chosen
    /// name when omitted.
    async fn sign_in(&self, display_name: Option<String>) -> Result<Session, AuthError>;

    /// End the current session. Failure leaves the session untouched.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Session change notifications. The receiver carries the current
    /// value immediately, so subscribers observe the startup state
    /// without waiting for a change.
    fn sessions(&self) -> watch::Receiver<Option<Session>>;
}

/// The persisted, per-user, ordered append-only log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one entry under `user_id`. Returns the store-assigned id.
    async fn append(&self, user_id: &str, entry: NewEntry) -> Result<String, WriteError>;

    /// Open a live subscription scoped to `user_id`, ordered ascending by
    /// creation timestamp. The first emission is the current snapshot;
    /// every later change under that user produces a fresh full snapshot.
    /// Dropping the stream unsubscribes.
    async fn subscribe_ordered(&self, user_id: &str)
        -> Result<SnapshotStream, SubscriptionError>;
}

/// Live feed of whole-history snapshots for one user.
pub struct SnapshotStream {
    rx: mpsc::Receiver<HistorySnapshot>,
}

impl SnapshotStream {
    pub fn from_receiver(rx: mpsc::Receiver<HistorySnapshot>) -> Self {
        Self { rx }
    }

    /// Next snapshot, or `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<HistorySnapshot> {
        self.rx.recv().await
    }
}

/// The remote text classifier.
#[async_trait]
pub trait TextClassifier: Send + Sync {
    /// Classify `text` into an ordered list of label/score pairs, best
    /// match first.
    async fn classify(&self, text: &str) -> Result<Vec<LabelScore>, RequestError>;

    /// Implementation name for logging (e.g. "http", "fake").
    fn name(&self) -> &str;
}
