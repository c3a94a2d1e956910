//! HTTP delivery of metric batches.
//!
//! Serialization and compression failures are programming or data
//! errors and fail at once; only the network send itself runs under
//! the backoff driver.

use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use thiserror::Error;

use pulsegrid_core::{HASH_HEADER, Metric, MetricEnvelope, codec, signing};
use pulsegrid_retry::{Retriable, with_backoff};

/// Errors surfaced while shipping a batch.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to encode batch: {0}")]
    Encode(String),

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected batch with status {0}")]
    Status(u16),
}

impl Retriable for SendError {
    fn is_retriable(&self) -> bool {
        match self {
            // A status reply means the server received and judged the
            // request; resending an invalid batch cannot help.
            SendError::Transport(e) => e.is_retriable(),
            SendError::Encode(_) | SendError::Status(_) => false,
        }
    }
}

/// Encodes, signs, and POSTs batches to the collector.
pub struct MetricSender {
    client: reqwest::Client,
    endpoint: String,
    key: Option<String>,
}

impl MetricSender {
    pub fn new(base_url: &str, key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/updates/", base_url.trim_end_matches('/')),
            key,
        }
    }

    /// Ship one batch. Empty batches are skipped without a request.
    pub async fn ship(&self, batch: &[Metric]) -> Result<(), SendError> {
        if batch.is_empty() {
            return Ok(());
        }

        let envelopes: Vec<MetricEnvelope> = batch.iter().map(MetricEnvelope::from).collect();
        let payload = serde_json::to_vec(&envelopes).map_err(|e| SendError::Encode(e.to_string()))?;
        // The signature covers the payload before compression.
        let signature = self
            .key
            .as_ref()
            .map(|key| signing::sign(key.as_bytes(), &payload));
        let body = codec::encode_payload(&payload).map_err(|e| SendError::Encode(e.to_string()))?;

        with_backoff(|| self.post(body.clone(), signature.clone())).await
    }

    async fn post(&self, body: Vec<u8>, signature: Option<String>) -> Result<(), SendError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body);
        if let Some(signature) = signature {
            request = request.header(HASH_HEADER, signature);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SendError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_rejections_are_terminal() {
        assert!(!SendError::Status(400).is_retriable());
        assert!(!SendError::Status(500).is_retriable());
    }

    #[test]
    fn encode_failures_are_terminal() {
        assert!(!SendError::Encode("bad".to_string()).is_retriable());
    }

    #[test]
    fn endpoint_normalizes_trailing_slash() {
        let sender = MetricSender::new("http://localhost:8080/", None);
        assert_eq!(sender.endpoint, "http://localhost:8080/updates/");
    }
}
