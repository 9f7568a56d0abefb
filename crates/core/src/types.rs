// crates/core/src/types.rs
//! Domain types shared between the sync pipeline and the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The current authenticated principal.
///
/// Absence of a session is modeled as `Option<Session>` -- the identity
/// provider reports `None` when nobody is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque user identifier assigned by the identity provider.
    pub user_id: String,
    /// Human-readable name for the UI greeting.
    pub display_name: String,
}

/// One label/confidence pair from the remote classifier.
///
/// The classifier returns an ordered list of these, best match first.
/// `score` is a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// One persisted classification, owned by the history store.
///
/// `timestamp` is assigned by the store at commit time and may be absent
/// for a moment right after a write ("pending"). Pending entries sort
/// after all timestamped ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Store-assigned unique identifier.
    pub id: String,
    /// The text the user submitted.
    pub text: String,
    /// Ordered classifier output, best match first. May be empty for a
    /// malformed entry; the projector skips those.
    pub result: Vec<LabelScore>,
    /// Store-assigned creation time; `None` while the write is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    /// The top-ranked classification, if the entry carries one.
    pub fn top_result(&self) -> Option<&LabelScore> {
        self.result.first()
    }
}

/// The full ordered history known to the client for the active session.
///
/// Replaced wholesale on every feed emission -- never patched in place.
pub type HistorySnapshot = Vec<HistoryEntry>;

/// Sort entries chronologically, oldest first, pending timestamps last.
///
/// The store already emits ascending order; this is the canonical rule it
/// (and the tests) use.
pub fn sort_chronological(entries: &mut [HistoryEntry]) {
    entries.sort_by_key(|e| (e.timestamp.is_none(), e.timestamp));
}

/// Transient outcome of the most recent manual classify action.
///
/// Owned by the coordinator, independent of the persisted history: the UI
/// shows it immediately, whether or not the write-back succeeds. `seq` is
/// the request sequence number that produced it (last-request-wins).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutcome {
    pub result: Vec<LabelScore>,
    pub seq: u64,
}

/// Chart-ready projection of a history snapshot.
///
/// `values` are percentages rounded to two decimals, in chronological
/// order. The axis bounds are padded so the line never sits on the frame
/// edge (see [`crate::projector::project`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub suggested_min: f64,
    pub suggested_max: f64,
}
