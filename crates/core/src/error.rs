// crates/core/src/error.rs
use thiserror::Error;

/// Errors from the identity provider. Never fatal: a failed sign-in or
/// sign-out leaves the current session untouched.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sign-in rejected: {reason}")]
    SignInRejected { reason: String },

    #[error("sign-out failed: {reason}")]
    SignOutFailed { reason: String },

    #[error("identity provider unavailable")]
    ProviderUnavailable,
}

/// Errors from the remote classifier call. The only error class that is
/// surfaced to the user as an explicit failed state.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("classifier request failed: {message}")]
    Transport { message: String },

    #[error("classifier endpoint returned status {status}")]
    Status { status: u16 },

    #[error("classifier response could not be decoded: {message}")]
    Decode { message: String },
}

/// Errors from the best-effort history write-back. Always caught, logged,
/// and swallowed by the coordinator.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("history write failed: {message}")]
    Store { message: String },

    #[error("history write requires a signed-in session")]
    NoSession,
}

/// Errors from the history feed subscription. Degrade to an empty history
/// view, never a crash.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("history subscription failed: {message}")]
    Store { message: String },

    #[error("history feed closed")]
    Closed,
}

impl RequestError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl WriteError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}

impl SubscriptionError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}
