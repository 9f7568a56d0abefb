// crates/server/tests/pipeline_test.rs
//! Pipeline behavior against scripted fake services.
//!
//! Covers the synchronization invariants: single live subscription per
//! session, wholesale snapshot replacement, sign-out clearing, classify
//! no-op on empty input, last-request-wins on overlapping calls, and
//! best-effort persistence.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use moodline_core::{
    AuthError, HistoryEntry, LabelScore, RequestError, Session, SubscriptionError, WriteError,
};
use moodline_server::pipeline::{Pipeline, ViewState};
use moodline_server::services::{
    HistoryStore, IdentityService, NewEntry, SnapshotStream, TextClassifier,
};
use tokio::sync::{broadcast, mpsc, watch, Mutex};

// ============================================================================
// Fakes
// ============================================================================

struct FakeIdentity {
    tx: watch::Sender<Option<Session>>,
}

impl FakeIdentity {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            tx: watch::channel(None).0,
        })
    }

    /// Push a session change, as if the provider notified us.
    fn set(&self, session: Option<Session>) {
        // send_replace: delivery must not depend on anyone listening.
        self.tx.send_replace(session);
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn sign_in(&self, display_name: Option<String>) -> Result<Session, AuthError> {
        let name = display_name.unwrap_or_else(|| "Test".into());
        let session = session_for(&name);
        self.set(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.set(None);
        Ok(())
    }

    fn sessions(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

fn session_for(name: &str) -> Session {
    Session {
        user_id: format!("user-{}", name.to_lowercase()),
        display_name: name.to_string(),
    }
}

type LogMap = Arc<Mutex<HashMap<String, Vec<HistoryEntry>>>>;

struct FakeStore {
    logs: LogMap,
    change_tx: broadcast::Sender<String>,
    /// Every user id passed to subscribe_ordered, in order.
    subscribed_users: Mutex<Vec<String>>,
    fail_append: AtomicBool,
    fail_subscribe: AtomicBool,
    next_id: AtomicU64,
}

impl FakeStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            logs: Arc::new(Mutex::new(HashMap::new())),
            change_tx: broadcast::channel(64).0,
            subscribed_users: Mutex::new(Vec::new()),
            fail_append: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        })
    }

    fn make_entry(&self, text: &str, result: Vec<LabelScore>) -> HistoryEntry {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        HistoryEntry {
            id: format!("entry-{n}"),
            text: text.to_string(),
            result,
            timestamp: Some(Utc.timestamp_opt(1_700_000_000 + n as i64, 0).unwrap()),
        }
    }

    /// Append directly to the backing log, bypassing failure injection --
    /// as if another device wrote to the same user's history.
    async fn seed(&self, user_id: &str, text: &str, score: f64) {
        let entry = self.make_entry(
            text,
            vec![LabelScore {
                label: "POSITIVE".into(),
                score,
            }],
        );
        self.logs
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(entry);
        let _ = self.change_tx.send(user_id.to_string());
    }

    async fn log_len(&self, user_id: &str) -> usize {
        self.logs
            .lock()
            .await
            .get(user_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn subscribed(&self) -> Vec<String> {
        self.subscribed_users.lock().await.clone()
    }
}

#[async_trait]
impl HistoryStore for FakeStore {
    async fn append(&self, user_id: &str, entry: NewEntry) -> Result<String, WriteError> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(WriteError::store("injected append failure"));
        }
        let stored = self.make_entry(&entry.text, entry.result);
        let id = stored.id.clone();
        self.logs
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(stored);
        let _ = self.change_tx.send(user_id.to_string());
        Ok(id)
    }

    async fn subscribe_ordered(
        &self,
        user_id: &str,
    ) -> Result<SnapshotStream, SubscriptionError> {
        self.subscribed_users.lock().await.push(user_id.to_string());
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SubscriptionError::store("injected subscribe failure"));
        }

        let mut changes = self.change_tx.subscribe();
        let logs = self.logs.clone();
        let user_id = user_id.to_string();
        let initial = logs.lock().await.get(&user_id).cloned().unwrap_or_default();

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            if tx.send(initial).await.is_err() {
                return;
            }
            while let Ok(changed) = changes.recv().await {
                if changed != user_id {
                    continue;
                }
                let snapshot = logs.lock().await.get(&user_id).cloned().unwrap_or_default();
                if tx.send(snapshot).await.is_err() {
                    break;
                }
            }
        });

        Ok(SnapshotStream::from_receiver(rx))
    }
}

struct FakeClassifier {
    responses: Mutex<VecDeque<(Duration, Result<Vec<LabelScore>, RequestError>)>>,
    calls: AtomicUsize,
}

impl FakeClassifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        })
    }

    async fn push(&self, delay: Duration, response: Result<Vec<LabelScore>, RequestError>) {
        self.responses.lock().await.push_back((delay, response));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextClassifier for FakeClassifier {
    async fn classify(&self, _text: &str) -> Result<Vec<LabelScore>, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.responses.lock().await.pop_front();
        match scripted {
            Some((delay, response)) => {
                tokio::time::sleep(delay).await;
                response
            }
            None => Ok(label("POSITIVE", 0.9)),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

fn label(name: &str, score: f64) -> Vec<LabelScore> {
    vec![LabelScore {
        label: name.into(),
        score,
    }]
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    identity: Arc<FakeIdentity>,
    store: Arc<FakeStore>,
    classifier: Arc<FakeClassifier>,
    pipeline: Arc<Pipeline>,
}

fn start() -> Harness {
    let identity = FakeIdentity::new();
    let store = FakeStore::new();
    let classifier = FakeClassifier::new();
    let pipeline = Pipeline::start(identity.clone(), store.clone(), classifier.clone());
    Harness {
        identity,
        store,
        classifier,
        pipeline,
    }
}

/// Poll the view until the predicate holds. Sleeps are virtual (all
/// tests run with paused time), so this converges immediately.
async fn wait_view<F>(pipeline: &Pipeline, pred: F) -> ViewState
where
    F: Fn(&ViewState) -> bool,
{
    for _ in 0..400 {
        let view = pipeline.view().await;
        if pred(&view) {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("view condition not met in time");
}

/// Let spawned tasks and virtual time make progress.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// Session / feed tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sign_in_opens_feed_and_populates_snapshot() {
    let h = start();
    h.store.seed("user-a", "seeded", 0.8).await;

    h.identity.set(Some(session_for("A")));
    let view = wait_view(&h.pipeline, |v| v.snapshot.len() == 1).await;

    assert!(!view.resolving);
    assert_eq!(view.session.unwrap().user_id, "user-a");
    assert_eq!(view.snapshot[0].text, "seeded");
}

#[tokio::test(start_paused = true)]
async fn test_resolving_clears_after_first_notification() {
    let h = start();
    let view = wait_view(&h.pipeline, |v| !v.resolving).await;
    assert!(view.session.is_none());
    assert!(view.snapshot.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_session_switch_closes_previous_feed() {
    let h = start();
    h.store.seed("user-a", "alpha", 0.1).await;
    h.store.seed("user-b", "beta", 0.2).await;

    h.identity.set(Some(session_for("A")));
    wait_view(&h.pipeline, |v| {
        v.snapshot.len() == 1 && v.snapshot[0].text == "alpha"
    })
    .await;

    h.identity.set(Some(session_for("B")));
    wait_view(&h.pipeline, |v| {
        v.snapshot.len() == 1 && v.snapshot[0].text == "beta"
    })
    .await;

    // A write under the OLD user must not reach the view: the previous
    // subscription is closed, not merely ignored on the screen.
    h.store.seed("user-a", "late alpha", 0.3).await;
    settle().await;
    let view = h.pipeline.view().await;
    assert_eq!(view.snapshot.len(), 1);
    assert_eq!(view.snapshot[0].text, "beta");

    // Exactly one subscription was opened per session.
    assert_eq!(h.store.subscribed().await, vec!["user-a", "user-b"]);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_clears_snapshot_and_stops_callbacks() {
    let h = start();
    h.store.seed("user-a", "alpha", 0.5).await;

    h.identity.set(Some(session_for("A")));
    wait_view(&h.pipeline, |v| v.snapshot.len() == 1).await;

    h.identity.set(None);
    wait_view(&h.pipeline, |v| v.session.is_none() && v.snapshot.is_empty()).await;

    // Further store activity for the signed-out user is not processed.
    h.store.seed("user-a", "after sign-out", 0.6).await;
    settle().await;
    assert!(h.pipeline.view().await.snapshot.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_clears_transient_outcome() {
    let h = start();
    h.identity.set(Some(session_for("A")));
    wait_view(&h.pipeline, |v| v.session.is_some()).await;

    h.pipeline.coordinator().classify("nice").await.unwrap();
    wait_view(&h.pipeline, |v| v.outcome.is_some()).await;

    h.identity.set(None);
    let view = wait_view(&h.pipeline, |v| v.session.is_none()).await;
    assert!(view.outcome.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_subscription_failure_degrades_to_empty_history() {
    let h = start();
    h.store.fail_subscribe.store(true, Ordering::SeqCst);
    h.store.seed("user-a", "invisible", 0.5).await;

    h.identity.set(Some(session_for("A")));
    let view = wait_view(&h.pipeline, |v| v.session.is_some()).await;

    settle().await;
    assert!(view.snapshot.is_empty());
    assert!(h.pipeline.view().await.snapshot.is_empty());
}

// ============================================================================
// Classify tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_classify_empty_text_is_a_noop() {
    let h = start();

    let outcome = h.pipeline.coordinator().classify("").await.unwrap();
    assert!(outcome.is_none());
    let outcome = h.pipeline.coordinator().classify("   \t ").await.unwrap();
    assert!(outcome.is_none());

    assert_eq!(h.classifier.calls(), 0);
    let view = h.pipeline.view().await;
    assert!(view.outcome.is_none());
    assert!(!view.loading);
}

#[tokio::test(start_paused = true)]
async fn test_classify_installs_outcome_and_persists() {
    let h = start();
    h.identity.set(Some(session_for("A")));
    wait_view(&h.pipeline, |v| v.session.is_some()).await;

    h.classifier
        .push(Duration::ZERO, Ok(label("POSITIVE", 0.97)))
        .await;
    let outcome = h
        .pipeline
        .coordinator()
        .classify("what a day")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.result[0].label, "POSITIVE");
    assert_eq!(h.store.log_len("user-a").await, 1);

    // The write loops back through the feed into the snapshot.
    let view = wait_view(&h.pipeline, |v| v.snapshot.len() == 1).await;
    assert_eq!(view.snapshot[0].text, "what a day");
    assert!(!view.loading);
    assert_eq!(view.outcome.unwrap().result[0].label, "POSITIVE");
}

#[tokio::test(start_paused = true)]
async fn test_classify_without_session_shows_but_does_not_persist() {
    let h = start();
    wait_view(&h.pipeline, |v| !v.resolving).await;

    let outcome = h.pipeline.coordinator().classify("hello").await.unwrap();
    assert!(outcome.is_some());

    settle().await;
    assert_eq!(h.store.log_len("user-a").await, 0);
    assert!(h.pipeline.view().await.outcome.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_classify_write_failure_keeps_outcome_visible() {
    let h = start();
    h.identity.set(Some(session_for("A")));
    wait_view(&h.pipeline, |v| v.session.is_some()).await;
    h.store.fail_append.store(true, Ordering::SeqCst);

    let outcome = h.pipeline.coordinator().classify("doomed write").await;

    // Persistence failure is swallowed; the classify call still succeeds.
    assert!(outcome.unwrap().is_some());
    assert_eq!(h.store.log_len("user-a").await, 0);
    let view = h.pipeline.view().await;
    assert!(view.outcome.is_some());
    assert!(!view.loading);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_classify_last_request_wins() {
    let h = start();
    wait_view(&h.pipeline, |v| !v.resolving).await;

    // First request resolves LAST (slow), second resolves first.
    h.classifier
        .push(Duration::from_millis(100), Ok(label("NEGATIVE", 0.2)))
        .await;
    h.classifier
        .push(Duration::from_millis(10), Ok(label("POSITIVE", 0.9)))
        .await;

    let (first, second) = tokio::join!(
        h.pipeline.coordinator().classify("slow request"),
        h.pipeline.coordinator().classify("fast request"),
    );
    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_some());

    // The visible outcome belongs to the later request even though its
    // response arrived earlier.
    let view = h.pipeline.view().await;
    let outcome = view.outcome.unwrap();
    assert_eq!(outcome.seq, 2);
    assert_eq!(outcome.result[0].label, "POSITIVE");
    assert!(!view.loading);
}

#[tokio::test(start_paused = true)]
async fn test_classifier_failure_clears_loading_and_surfaces() {
    let h = start();
    wait_view(&h.pipeline, |v| !v.resolving).await;

    h.classifier
        .push(Duration::ZERO, Err(RequestError::Status { status: 500 }))
        .await;
    let result = h.pipeline.coordinator().classify("will fail").await;

    assert!(result.is_err());
    let view = h.pipeline.view().await;
    assert!(!view.loading, "failure must not leave loading stuck on");
    assert!(view.outcome.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_request_does_not_replace_newer_outcome() {
    let h = start();
    wait_view(&h.pipeline, |v| !v.resolving).await;

    // Slow failure racing a fast success.
    h.classifier
        .push(
            Duration::from_millis(100),
            Err(RequestError::transport("timeout")),
        )
        .await;
    h.classifier
        .push(Duration::from_millis(10), Ok(label("POSITIVE", 0.8)))
        .await;

    let (slow, fast) = tokio::join!(
        h.pipeline.coordinator().classify("slow failure"),
        h.pipeline.coordinator().classify("fast success"),
    );
    assert!(slow.is_err());
    assert!(fast.unwrap().is_some());

    let view = h.pipeline.view().await;
    assert_eq!(view.outcome.unwrap().result[0].label, "POSITIVE");
    assert!(!view.loading);
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_both_subscriptions() {
    let h = start();
    h.store.seed("user-a", "alpha", 0.5).await;
    h.identity.set(Some(session_for("A")));
    wait_view(&h.pipeline, |v| v.snapshot.len() == 1).await;

    h.pipeline.shutdown().await;

    // Neither identity changes nor store writes are processed anymore.
    h.identity.set(None);
    h.store.seed("user-a", "post-shutdown", 0.5).await;
    settle().await;
    let view = h.pipeline.view().await;
    assert!(view.session.is_some(), "tracker no longer applies changes");
    assert_eq!(view.snapshot.len(), 1);
}
