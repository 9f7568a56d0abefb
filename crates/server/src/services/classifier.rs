// crates/server/src/services/classifier.rs
//! HTTP client for the remote text-classification endpoint.
//!
//! The endpoint takes the text as a query parameter and answers with an
//! ordered JSON array of `{label, score}` pairs, best match first.

use async_trait::async_trait;
use moodline_core::{LabelScore, RequestError};
use tracing::debug;

use super::TextClassifier;

/// Per-request timeout. The classifier runs a model; give it headroom
/// without letting a dead endpoint hold the loading state forever.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    /// `endpoint` is the full analysis URL without the query string,
    /// e.g. `http://127.0.0.1:8601/analyze`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TextClassifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<Vec<LabelScore>, RequestError> {
        let url = format!("{}?text={}", self.endpoint, urlencoding::encode(text));
        debug!(endpoint = %self.endpoint, "Sending classification request");

        let resp = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| RequestError::transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RequestError::Status {
                status: status.as_u16(),
            });
        }

        resp.json::<Vec<LabelScore>>()
            .await
            .map_err(|e| RequestError::decode(e.to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}
