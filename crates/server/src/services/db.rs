// crates/server/src/services/db.rs
//! SQLite-backed history store.
//!
//! The log is append-only: one row per classification, keyed by user.
//! Timestamps are assigned here (server-side) at commit time. Change
//! notification is a broadcast of the touched user id; each subscription
//! re-queries its user's full snapshot on every matching notification,
//! so readers always receive whole, consistently-ordered snapshots.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moodline_core::{HistoryEntry, HistorySnapshot, LabelScore, SubscriptionError, WriteError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::{HistoryStore, NewEntry, SnapshotStream};

/// Capacity of the change-notification channel. A lagged subscription
/// re-queries on its next notification, so dropped notifications only
/// delay an emission, they never corrupt one.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Buffered snapshots per subscription before backpressure applies.
const SNAPSHOT_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to determine data directory")]
    NoDataDir,

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Inline SQL migrations for the moodline schema.
///
/// Simple inline statements rather than migration files -- the schema is
/// one table and one index.
const MIGRATIONS: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS history_entries (
    id        TEXT PRIMARY KEY,
    user_id   TEXT NOT NULL,
    text      TEXT NOT NULL,
    result    TEXT NOT NULL DEFAULT '[]',
    timestamp TEXT
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_history_user_time ON history_entries(user_id, timestamp);"#,
];

/// History store handle wrapping a SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
    change_tx: broadcast::Sender<String>,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_path_buf(),
            change_tx: broadcast::channel(CHANGE_CHANNEL_CAPACITY).0,
        };
        db.migrate().await?;
        info!(path = %db.db_path.display(), "History database ready");
        Ok(db)
    }

    /// Open at the default location under the platform data directory.
    pub async fn open_default() -> DbResult<Self> {
        let path = default_db_path().ok_or(DbError::NoDataDir)?;
        Self::new(&path).await
    }

    /// In-memory database for tests.
    pub async fn new_in_memory() -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
            change_tx: broadcast::channel(CHANGE_CHANNEL_CAPACITY).0,
        };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> DbResult<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Full ascending-ordered snapshot for one user, pending timestamps
    /// last.
    pub async fn snapshot(&self, user_id: &str) -> DbResult<HistorySnapshot> {
        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, text, result, timestamp
            FROM history_entries
            WHERE user_id = ?1
            ORDER BY timestamp IS NULL, timestamp ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries: HistorySnapshot = rows
            .into_iter()
            .map(|(id, text, result, timestamp)| HistoryEntry {
                id,
                text,
                result: decode_result(&result),
                timestamp: timestamp.and_then(|t| parse_timestamp(&t)),
            })
            .collect();
        // Re-apply the canonical order after parsing: a timestamp that
        // failed to parse becomes pending and must sort last, even
        // though SQL ordered its raw text value.
        moodline_core::sort_chronological(&mut entries);
        Ok(entries)
    }

    /// Insert one entry with a server-assigned id and timestamp, then
    /// notify subscriptions for that user.
    pub async fn insert_entry(&self, user_id: &str, entry: &NewEntry) -> DbResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let timestamp = Utc::now().to_rfc3339();
        let result = serde_json::to_string(&entry.result).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO history_entries (id, user_id, text, result, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&entry.text)
        .bind(&result)
        .bind(&timestamp)
        .execute(&self.pool)
        .await?;

        // No receivers is fine -- nobody is subscribed to this user yet.
        let _ = self.change_tx.send(user_id.to_string());
        Ok(id)
    }
}

/// Decode the stored JSON result column. A row that fails to decode is
/// kept with an empty result list -- the projector skips it.
fn decode_result(raw: &str) -> Vec<LabelScore> {
    match serde_json::from_str(raw) {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Malformed result column in history entry");
            Vec::new()
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(error = %e, "Malformed timestamp in history entry");
            None
        }
    }
}

fn default_db_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("moodline").join("history.db"))
}

#[async_trait]
impl HistoryStore for Database {
    async fn append(&self, user_id: &str, entry: NewEntry) -> Result<String, WriteError> {
        self.insert_entry(user_id, &entry)
            .await
            .map_err(|e| WriteError::store(e.to_string()))
    }

    async fn subscribe_ordered(
        &self,
        user_id: &str,
    ) -> Result<SnapshotStream, SubscriptionError> {
        // Subscribe to changes before the initial query so an append
        // landing between the two still triggers a re-query.
        let mut changes = self.change_tx.subscribe();
        let initial = self
            .snapshot(user_id)
            .await
            .map_err(|e| SubscriptionError::store(e.to_string()))?;

        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let db = self.clone();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            if tx.send(initial).await.is_err() {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(changed_user) if changed_user == user_id => {}
                    Ok(_) => continue,
                    // Lagged: we may have missed a change for this user,
                    // re-query unconditionally.
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, user_id = %user_id, "History feed lagged, re-querying");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let snapshot = match db.snapshot(&user_id).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "History re-query failed, keeping stale snapshot");
                        continue;
                    }
                };
                if tx.send(snapshot).await.is_err() {
                    // Subscriber dropped the stream -- unsubscribe.
                    break;
                }
            }
        });

        Ok(SnapshotStream::from_receiver(rx))
    }
}
