//! Annotation client
//!
//! Turns a raw variant string into an [`AnnotationResult`]: detect, consult
//! the cache, take a rate-limit permit, call the oracle under a deadline,
//! summarize the record, and write the result through to the cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use varanno_common::AnnotationResult;

use crate::cache::ResponseCache;
use crate::config::AnnotatorConfig;
use crate::detect::{Variant, VariantQuery};
use crate::error::{AnnotateError, Result};
use crate::oracle::{HttpVepOracle, OracleError, VepOracle, VepRecord};
use crate::rate_limit::{RateLimitConfig, RateLimiter};

/// Default deadline for one upstream call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared annotation client. Clones share the oracle, cache and limiter.
#[derive(Clone)]
pub struct AnnotationClient {
    oracle: Arc<dyn VepOracle>,
    cache: ResponseCache,
    limiter: RateLimiter,
    request_timeout: Duration,
    frequency_sources: Arc<[String]>,
}

impl std::fmt::Debug for AnnotationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationClient")
            .field("schema_version", &self.oracle.schema_version())
            .field("cache_entries", &self.cache.len())
            .field("rate_limit", &self.limiter.config())
            .field("request_timeout", &self.request_timeout)
            .field("frequency_sources", &self.frequency_sources)
            .finish()
    }
}

impl AnnotationClient {
    /// Client with default limiter, cache and timeout.
    pub fn new(oracle: Arc<dyn VepOracle>) -> Self {
        Self::builder(oracle).build()
    }

    pub fn builder(oracle: Arc<dyn VepOracle>) -> AnnotationClientBuilder {
        AnnotationClientBuilder::new(oracle)
    }

    /// Client talking to the configured VEP endpoint.
    pub fn from_config(config: &AnnotatorConfig) -> std::result::Result<Self, OracleError> {
        let oracle = HttpVepOracle::from_config(config)?;

        Ok(Self::builder(Arc::new(oracle))
            .rate_limit(config.rate_limit())
            .cache(ResponseCache::new(config.cache_ttl))
            .request_timeout(config.request_timeout)
            .frequency_sources(config.frequency_sources.clone())
            .build())
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Annotate one variant.
    ///
    /// Invalid input fails before the cache or the limiter is touched.
    /// Throttling is reported as-is; retrying is the caller's decision.
    #[instrument(skip(self))]
    pub async fn annotate(&self, raw: &str) -> Result<AnnotationResult> {
        let Some(variant) = VariantQuery::parse(raw).into_variant() else {
            debug!("Rejected input");
            return Err(AnnotateError::InvalidFormat(raw.to_string()));
        };
        let key = variant.canonical_key();

        if let Some(hit) = self.cache.get(key) {
            return Ok(hit);
        }

        let queued_at = tokio::time::Instant::now();
        let permit = self.limiter.acquire().await;
        let waited = permit.granted_at().saturating_duration_since(queued_at);
        if !waited.is_zero() {
            debug!(key = %key, waited_ms = waited.as_millis() as u64, "Waited for rate limit permit");
        }

        let record = match tokio::time::timeout(self.request_timeout, self.oracle.fetch(&variant)).await
        {
            Ok(fetched) => fetched?,
            Err(_) => {
                warn!(key = %key, timeout = ?self.request_timeout, "Upstream call timed out");
                return Err(AnnotateError::Timeout(self.request_timeout));
            },
        };

        let result = self.summarize(&variant, &record)?;
        self.cache.insert(key, result.clone());

        Ok(result)
    }

    /// Annotate several variants concurrently; results keep input order.
    pub async fn annotate_many<I, S>(&self, raws: I) -> Vec<Result<AnnotationResult>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let raws: Vec<S> = raws.into_iter().collect();
        futures::future::join_all(raws.iter().map(|raw| self.annotate(raw.as_ref()))).await
    }

    fn summarize(&self, variant: &Variant, record: &VepRecord) -> Result<AnnotationResult> {
        let consequence = record.consequence().ok_or_else(|| {
            AnnotateError::UpstreamError(format!(
                "no consequence reported for {}",
                variant.canonical_key()
            ))
        })?;

        // Coordinates name their own allele; transcript changes rely on the
        // allele the upstream resolved them to.
        let allele = variant
            .frequency_allele()
            .or_else(|| record.reported_alternate().map(str::to_string));
        let frequency = allele
            .as_deref()
            .and_then(|allele| record.allele_frequency(allele, &self.frequency_sources));

        Ok(AnnotationResult::new(
            consequence,
            record.most_severe_impact(),
            self.oracle.schema_version(),
        )
        .with_score(record.deleteriousness_score())
        .with_frequency(frequency))
    }
}

/// Builder for [`AnnotationClient`]
pub struct AnnotationClientBuilder {
    oracle: Arc<dyn VepOracle>,
    cache: Option<ResponseCache>,
    limiter: Option<RateLimiter>,
    request_timeout: Duration,
    frequency_sources: Vec<String>,
}

impl AnnotationClientBuilder {
    fn new(oracle: Arc<dyn VepOracle>) -> Self {
        Self {
            oracle,
            cache: None,
            limiter: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            frequency_sources: AnnotatorConfig::default().frequency_sources,
        }
    }

    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share an existing limiter, e.g. across several clients.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn rate_limit(self, config: RateLimitConfig) -> Self {
        self.rate_limiter(RateLimiter::new(config))
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Frequency sources in priority order.
    pub fn frequency_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.frequency_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> AnnotationClient {
        AnnotationClient {
            oracle: self.oracle,
            cache: self.cache.unwrap_or_default(),
            limiter: self.limiter.unwrap_or_default(),
            request_timeout: self.request_timeout,
            frequency_sources: self.frequency_sources.into(),
        }
    }
}
