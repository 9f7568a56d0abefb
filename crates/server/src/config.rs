// crates/server/src/config.rs
//! Environment-driven server configuration.

use std::path::PathBuf;

/// Default port for the server.
const DEFAULT_PORT: u16 = 47311;

/// Default endpoint of the remote analysis service.
const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:8601/analyze";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// SQLite file for the history log; `None` falls back to the
    /// platform data directory.
    pub db_path: Option<PathBuf>,
    /// Full URL of the classifier endpoint (text goes in the query).
    pub classifier_url: String,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// - `MOODLINE_PORT` (or `PORT`) -- listen port
    /// - `MOODLINE_DB` -- history database path
    /// - `MOODLINE_CLASSIFIER_URL` -- analysis endpoint
    pub fn from_env() -> Self {
        Self {
            port: get_port(),
            db_path: std::env::var("MOODLINE_DB").ok().map(PathBuf::from),
            classifier_url: std::env::var("MOODLINE_CLASSIFIER_URL")
                .unwrap_or_else(|_| DEFAULT_CLASSIFIER_URL.to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: None,
            classifier_url: DEFAULT_CLASSIFIER_URL.to_string(),
        }
    }
}

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("MOODLINE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}
