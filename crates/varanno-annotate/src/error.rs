//! Annotation error taxonomy
//!
//! Every outcome of a single annotation is a distinct variant so callers can
//! decide what to retry without parsing messages.

use std::time::Duration;

use thiserror::Error;

use crate::oracle::OracleError;

/// Result type alias for annotation operations
pub type Result<T> = std::result::Result<T, AnnotateError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotateError {
    /// Input is neither coordinate nor transcript-change notation
    #[error("Invalid variant format: '{0}'. Expected 'chrom:pos:ref:alt' (e.g. '17:41234470:T:A') or 'accession:c.change' (e.g. 'NM_000492.3:c.1521_1523del').")]
    InvalidFormat(String),

    /// Upstream did not answer within the deadline
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream explicitly rejected the call for rate limiting
    #[error("Upstream throttled the request{}", retry_hint(.retry_after))]
    UpstreamThrottled { retry_after: Option<Duration> },

    /// Any other upstream failure
    #[error("Upstream error: {0}")]
    UpstreamError(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(after) => format!(" (retry after {}s)", after.as_secs()),
        None => String::new(),
    }
}

impl AnnotateError {
    /// Transient failures a caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AnnotateError::InvalidFormat(_))
    }

    /// Minimum delay the upstream asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AnnotateError::UpstreamThrottled { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short machine-readable label for reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnnotateError::InvalidFormat(_) => "invalid_format",
            AnnotateError::Timeout(_) => "timeout",
            AnnotateError::UpstreamThrottled { .. } => "upstream_throttled",
            AnnotateError::UpstreamError(_) => "upstream_error",
        }
    }
}

impl From<OracleError> for AnnotateError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Throttled { retry_after } => AnnotateError::UpstreamThrottled { retry_after },
            other => AnnotateError::UpstreamError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(!AnnotateError::InvalidFormat("x".into()).is_retryable());
        assert!(AnnotateError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(AnnotateError::UpstreamThrottled { retry_after: None }.is_retryable());
        assert!(AnnotateError::UpstreamError("HTTP 500".into()).is_retryable());
    }

    #[test]
    fn test_oracle_error_mapping() {
        let throttled: AnnotateError = OracleError::Throttled {
            retry_after: Some(Duration::from_secs(2)),
        }
        .into();
        assert_eq!(throttled.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(throttled.kind(), "upstream_throttled");

        let status: AnnotateError = OracleError::Status {
            status: 500,
            message: "boom".into(),
        }
        .into();
        assert!(matches!(status, AnnotateError::UpstreamError(ref m) if m.contains("500")));
    }

    #[test]
    fn test_throttled_message() {
        let err = AnnotateError::UpstreamThrottled {
            retry_after: Some(Duration::from_secs(4)),
        };
        assert_eq!(err.to_string(), "Upstream throttled the request (retry after 4s)");
    }
}
