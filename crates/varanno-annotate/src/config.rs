//! Configuration management
//!
//! Settings come from the environment (optionally via a `.env` file) with
//! the defaults below.

use std::time::Duration;

use varanno_common::{Result, VarannoError};

use crate::enrich::RetryPolicy;
use crate::rate_limit::RateLimitConfig;

// ============================================================================
// Annotator Configuration Constants
// ============================================================================

/// Default VEP REST base URL.
pub const DEFAULT_VEP_URL: &str = "https://rest.ensembl.org";

/// Default species path segment.
pub const DEFAULT_SPECIES: &str = "homo_sapiens";

/// Default upstream requests per second.
pub const DEFAULT_RATE_LIMIT_PER_SEC: usize = 15;

/// Default deadline for a single upstream call in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Default cache TTL in seconds (24 hours).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Default frequency sources, highest priority first.
pub const DEFAULT_FREQUENCY_SOURCES: &str = "gnomade,gnomadg,af";

/// Default schema version label stamped on results.
pub const DEFAULT_SCHEMA_VERSION: &str = "15.8";

/// Default number of variants annotated concurrently by a batch run.
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 4;

/// Default attempts per variant in a batch run.
pub const DEFAULT_ENRICH_MAX_ATTEMPTS: u32 = 3;

/// Annotator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatorConfig {
    pub vep_url: String,
    pub species: String,
    pub rate_limit_per_sec: usize,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    /// Frequency sources in priority order
    pub frequency_sources: Vec<String>,
    pub schema_version: String,
    pub enrich_concurrency: usize,
    pub enrich_max_attempts: u32,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            vep_url: DEFAULT_VEP_URL.to_string(),
            species: DEFAULT_SPECIES.to_string(),
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            frequency_sources: parse_list(DEFAULT_FREQUENCY_SOURCES),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            enrich_concurrency: DEFAULT_ENRICH_CONCURRENCY,
            enrich_max_attempts: DEFAULT_ENRICH_MAX_ATTEMPTS,
        }
    }
}

impl AnnotatorConfig {
    /// Load configuration from `.env`, the environment, and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from the environment and defaults
    ///
    /// Environment variables:
    /// - `VARANNO_VEP_URL`
    /// - `VARANNO_SPECIES`
    /// - `VARANNO_RATE_LIMIT_PER_SEC`
    /// - `VARANNO_REQUEST_TIMEOUT_SECS`
    /// - `VARANNO_CACHE_TTL_SECS`
    /// - `VARANNO_FREQUENCY_SOURCES` (comma-separated)
    /// - `VARANNO_SCHEMA_VERSION`
    /// - `VARANNO_ENRICH_CONCURRENCY`
    /// - `VARANNO_ENRICH_MAX_ATTEMPTS`
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            vep_url: std::env::var("VARANNO_VEP_URL").unwrap_or(defaults.vep_url),
            species: std::env::var("VARANNO_SPECIES").unwrap_or(defaults.species),
            rate_limit_per_sec: env_parse("VARANNO_RATE_LIMIT_PER_SEC")?
                .unwrap_or(defaults.rate_limit_per_sec),
            request_timeout: env_parse("VARANNO_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            cache_ttl: env_parse("VARANNO_CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            frequency_sources: std::env::var("VARANNO_FREQUENCY_SOURCES")
                .map(|s| parse_list(&s))
                .unwrap_or(defaults.frequency_sources),
            schema_version: std::env::var("VARANNO_SCHEMA_VERSION")
                .unwrap_or(defaults.schema_version),
            enrich_concurrency: env_parse("VARANNO_ENRICH_CONCURRENCY")?
                .unwrap_or(defaults.enrich_concurrency),
            enrich_max_attempts: env_parse("VARANNO_ENRICH_MAX_ATTEMPTS")?
                .unwrap_or(defaults.enrich_max_attempts),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.vep_url)
            .map_err(|e| VarannoError::config(format!("Invalid VEP URL '{}': {}", self.vep_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VarannoError::config(format!(
                "VEP URL must be http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.species.trim().is_empty() {
            return Err(VarannoError::config("Species cannot be empty"));
        }

        if self.rate_limit_per_sec == 0 {
            return Err(VarannoError::config("Rate limit must be greater than 0"));
        }

        if self.request_timeout.is_zero() {
            return Err(VarannoError::config("Request timeout must be greater than 0"));
        }

        if self.frequency_sources.is_empty() {
            return Err(VarannoError::config(
                "At least one frequency source must be configured",
            ));
        }

        if self.enrich_concurrency == 0 {
            return Err(VarannoError::config("Enrichment concurrency must be greater than 0"));
        }

        if self.enrich_max_attempts == 0 {
            return Err(VarannoError::config("Enrichment attempts must be greater than 0"));
        }

        if self.cache_ttl.is_zero() {
            tracing::warn!("Cache TTL is 0 - every lookup will go upstream");
        }

        Ok(())
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::per_second(self.rate_limit_per_sec)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.enrich_max_attempts,
            ..RetryPolicy::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| VarannoError::config(format!("{} has an invalid value: '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
