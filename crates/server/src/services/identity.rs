// crates/server/src/services/identity.rs
//! Local identity provider backed by a watch channel.
//!
//! Stands in for an external auth service: sign-in installs a session,
//! sign-out clears it, and every change is pushed to subscribers through
//! the watch channel. The session id is derived deterministically from
//! the display name so the same person keeps the same history across
//! sign-ins.

use async_trait::async_trait;
use moodline_core::{AuthError, Session};
use tokio::sync::watch;

use super::IdentityService;

/// Display name used when sign-in does not provide one.
const DEFAULT_DISPLAY_NAME: &str = "Guest";

pub struct LocalIdentity {
    tx: watch::Sender<Option<Session>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable user id for a display name: lowercased, whitespace collapsed
/// to hyphens, prefixed so ids are recognizably local.
fn user_id_for(display_name: &str) -> String {
    let slug: String = display_name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    format!("local-{slug}")
}

#[async_trait]
impl IdentityService for LocalIdentity {
    async fn sign_in(&self, display_name: Option<String>) -> Result<Session, AuthError> {
        let display_name = display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        let session = Session {
            user_id: user_id_for(&display_name),
            display_name,
        };

        // send_replace: the state change holds whether or not anyone is
        // currently subscribed.
        self.tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.tx.send_replace(None);
        Ok(())
    }

    fn sessions(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}
