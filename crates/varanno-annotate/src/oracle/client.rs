//! HTTP client for the Ensembl VEP REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::endpoints;
use super::types::VepRecord;
use super::{OracleError, VepOracle};
use crate::config::AnnotatorConfig;
use crate::detect::Variant;

/// Upper bound on how much of an error body is kept in messages.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Ensembl error bodies look like `{"error": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// VEP oracle backed by the Ensembl REST service.
///
/// The annotation client applies its own deadline around every call, so no
/// request timeout is configured here beyond connection setup.
#[derive(Debug, Clone)]
pub struct HttpVepOracle {
    client: Client,
    base_url: String,
    species: String,
    schema_version: String,
}

impl HttpVepOracle {
    pub fn new(
        base_url: impl Into<String>,
        species: impl Into<String>,
        schema_version: impl Into<String>,
    ) -> Result<Self, OracleError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("varanno/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OracleError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            species: species.into(),
            schema_version: schema_version.into(),
        })
    }

    pub fn from_config(config: &AnnotatorConfig) -> Result<Self, OracleError> {
        Self::new(
            config.vep_url.clone(),
            config.species.clone(),
            config.schema_version.clone(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn error_for_status(response: reqwest::Response) -> OracleError {
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());

        if status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::SERVICE_UNAVAILABLE && retry_after.is_some())
        {
            warn!(status = %status, retry_after = ?retry_after, "Upstream throttled request");
            return OracleError::Throttled { retry_after };
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);

        warn!(status = %status, "Upstream returned error status");
        OracleError::Status {
            status: status.as_u16(),
            message: truncate(&message, MAX_ERROR_BODY_CHARS),
        }
    }
}

#[async_trait]
impl VepOracle for HttpVepOracle {
    async fn fetch(&self, variant: &Variant) -> Result<VepRecord, OracleError> {
        let (url, body) = endpoints::request_for(&self.base_url, &self.species, variant);
        debug!(url = %url, key = %variant.canonical_key(), "Calling VEP");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        let records: Vec<VepRecord> = response
            .json()
            .await
            .map_err(|e| OracleError::Decode(e.to_string()))?;

        records
            .into_iter()
            .next()
            .ok_or_else(|| OracleError::NoResult(variant.canonical_key().to_string()))
    }

    fn schema_version(&self) -> &str {
        &self.schema_version
    }
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored.
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(message: &str, max_chars: usize) -> String {
    let trimmed = message.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        let mut headers = header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(header::RETRY_AFTER, "3".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));

        headers.insert(
            header::RETRY_AFTER,
            "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("  short  ", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_oracle_creation() {
        let oracle = HttpVepOracle::new("http://localhost:9999", "homo_sapiens", "15.8").unwrap();
        assert_eq!(oracle.base_url(), "http://localhost:9999");
        assert_eq!(oracle.schema_version(), "15.8");
    }
}
