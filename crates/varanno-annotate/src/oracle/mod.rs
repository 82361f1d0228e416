//! Upstream Variant Effect Predictor access
//!
//! [`VepOracle`] is the seam between the annotation client and the network.
//! [`HttpVepOracle`] talks to the Ensembl VEP REST API; tests substitute
//! their own implementations.

pub mod client;
pub mod endpoints;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::detect::Variant;

pub use client::HttpVepOracle;
pub use types::*;

/// Failure reported by an oracle implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    /// Upstream refused the request because of rate limiting
    #[error("upstream throttled the request (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    /// Non-success HTTP status
    #[error("upstream returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, TLS, or protocol failure before a status was received
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// Response body was not the expected shape
    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// Success status but no record for the submitted variant
    #[error("upstream returned no annotation for {0}")]
    NoResult(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            OracleError::Decode(err.to_string())
        } else {
            OracleError::Transport(err.to_string())
        }
    }
}

/// Source of raw variant effect predictions.
#[async_trait]
pub trait VepOracle: Send + Sync {
    /// Fetch the upstream record for one variant.
    async fn fetch(&self, variant: &Variant) -> Result<VepRecord, OracleError>;

    /// Version label stamped on results parsed from this oracle's responses.
    fn schema_version(&self) -> &str;
}
