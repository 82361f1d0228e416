//! Batch enrichment
//!
//! Drives a list of variants through the [`AnnotationClient`] and saves the
//! results to an [`AnnotationStore`]. One bad item never stops the run: each
//! failure is recorded with its cause and the batch moves on.
//!
//! Retries live here rather than in the client. Transient errors are retried
//! with exponential backoff; a throttled response waits as long as the
//! upstream asked, up to the backoff ceiling. Buffered store writes are
//! flushed once the batch is done.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use varanno_common::{AnnotationResult, VarannoError};

use crate::client::AnnotationClient;
use crate::config::{DEFAULT_ENRICH_CONCURRENCY, DEFAULT_ENRICH_MAX_ATTEMPTS};
use crate::detect::VariantQuery;
use crate::error::AnnotateError;
use crate::store::AnnotationStore;

/// Backoff schedule for transient annotation failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per item, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ENRICH_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    /// Backoff for this attempt, stretched to honour a throttling hint but
    /// never beyond `max_backoff`.
    fn delay_for(&self, attempt: u32, err: &AnnotateError) -> Duration {
        let backoff = self.backoff(attempt);
        err.retry_after()
            .map_or(backoff, |hint| hint.max(backoff).min(self.max_backoff))
    }
}

/// One item that could not be annotated or saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    /// Position in the input list (0-based)
    pub index: usize,
    pub variant: String,
    /// Short label: an annotation error kind, or "store"
    pub kind: String,
    pub reason: String,
}

/// Outcome report of one enrichment run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentStats {
    /// Items attempted (succeeded + failed)
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items already annotated before this run
    pub skipped: usize,
    /// Failures ordered by input position
    pub failures: Vec<ItemFailure>,
    /// Set when results could not be flushed to the store at the end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

impl EnrichmentStats {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.store_error.is_none()
    }

    fn record_failure(&mut self, failure: ItemFailure) {
        self.processed += 1;
        self.failed += 1;
        self.failures.push(failure);
    }
}

/// Per-item progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Succeeded,
    Failed,
    Skipped,
}

type ProgressFn = dyn Fn(ItemStatus) + Send + Sync;

enum ItemError {
    Annotate(AnnotateError),
    Store(VarannoError),
}

impl ItemError {
    fn into_failure(self, index: usize, variant: &str) -> ItemFailure {
        let (kind, reason) = match self {
            ItemError::Annotate(e) => (e.kind().to_string(), e.to_string()),
            ItemError::Store(e) => ("store".to_string(), e.to_string()),
        };
        ItemFailure {
            index,
            variant: variant.to_string(),
            kind,
            reason,
        }
    }
}

/// Batch job over an annotation client and a store.
pub struct EnrichmentJob {
    client: AnnotationClient,
    store: Arc<dyn AnnotationStore>,
    retry: RetryPolicy,
    concurrency: usize,
    on_progress: Option<Arc<ProgressFn>>,
}

impl EnrichmentJob {
    pub fn new(client: AnnotationClient, store: Arc<dyn AnnotationStore>) -> Self {
        Self {
            client,
            store,
            retry: RetryPolicy::default(),
            concurrency: DEFAULT_ENRICH_CONCURRENCY,
            on_progress: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Items in flight at once. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Called once for every item that is skipped, succeeds, or fails.
    pub fn on_progress(mut self, callback: impl Fn(ItemStatus) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn report(&self, status: ItemStatus) {
        if let Some(callback) = &self.on_progress {
            callback(status);
        }
    }

    /// Annotate and store every variant not already in the store.
    ///
    /// `limit` caps how many items are attempted; skipped items do not
    /// count against it.
    #[instrument(skip(self, variants), fields(total = variants.len()))]
    pub async fn enrich<S: AsRef<str>>(&self, variants: &[S], limit: Option<usize>) -> EnrichmentStats {
        let mut stats = EnrichmentStats::default();
        let mut attempted = 0usize;
        let mut pending = Vec::new();

        for (index, raw) in variants.iter().enumerate() {
            if limit.is_some_and(|max| attempted >= max) {
                debug!(limit = ?limit, "Item limit reached");
                break;
            }

            let raw = raw.as_ref();
            let key = store_key(raw);
            match self.store.is_annotated(&key).await {
                Ok(true) => {
                    debug!(key = %key, "Already annotated, skipping");
                    stats.skipped += 1;
                    self.report(ItemStatus::Skipped);
                },
                Ok(false) => {
                    attempted += 1;
                    pending.push((index, raw, key));
                },
                Err(e) => {
                    attempted += 1;
                    warn!(key = %key, error = %e, "Store lookup failed");
                    stats.record_failure(ItemError::Store(e).into_failure(index, raw));
                    self.report(ItemStatus::Failed);
                },
            }
        }

        let mut outcomes = stream::iter(pending)
            .map(|(index, raw, key)| async move {
                let outcome = self.process(raw, &key).await;
                (index, raw, outcome)
            })
            .buffer_unordered(self.concurrency);

        while let Some((index, raw, outcome)) = outcomes.next().await {
            match outcome {
                Ok(()) => {
                    stats.processed += 1;
                    stats.succeeded += 1;
                    self.report(ItemStatus::Succeeded);
                },
                Err(e) => {
                    let failure = e.into_failure(index, raw);
                    warn!(
                        index = failure.index,
                        variant = %failure.variant,
                        kind = %failure.kind,
                        reason = %failure.reason,
                        "Item failed"
                    );
                    stats.record_failure(failure);
                    self.report(ItemStatus::Failed);
                },
            }
        }

        stats.failures.sort_by_key(|f| f.index);

        if let Err(e) = self.store.flush().await {
            error!(error = %e, "Failed to flush annotation store");
            stats.store_error = Some(e.to_string());
        }

        info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            "Enrichment finished"
        );

        stats
    }

    async fn process(&self, raw: &str, key: &str) -> Result<(), ItemError> {
        let result = self.annotate_with_retry(raw).await.map_err(ItemError::Annotate)?;
        self.store.save(key, &result).await.map_err(ItemError::Store)
    }

    async fn annotate_with_retry(&self, raw: &str) -> Result<AnnotationResult, AnnotateError> {
        let mut attempt = 1;
        loop {
            match self.client.annotate(raw).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt, &err);
                    debug!(
                        variant = %raw,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }
}

/// Store key: the canonical key when the input parses, else the trimmed input.
fn store_key(raw: &str) -> String {
    let query = VariantQuery::parse(raw);
    query
        .canonical_key()
        .map_or_else(|| raw.trim().to_string(), str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::detect::Variant;
    use crate::oracle::{OracleError, VepOracle, VepRecord};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use varanno_common::Impact;

    /// Answers every variant, failing selected keys a set number of times.
    #[derive(Default)]
    struct ScriptedOracle {
        failures: Mutex<HashMap<String, (u32, OracleError)>>,
        calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn fail(self, key: &str, times: u32, err: OracleError) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(key.to_string(), (times, err));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VepOracle for ScriptedOracle {
        async fn fetch(&self, variant: &Variant) -> Result<VepRecord, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some((remaining, err)) = self
                .failures
                .lock()
                .unwrap()
                .get_mut(variant.canonical_key())
            {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(err.clone());
                }
            }

            Ok(serde_json::from_value(serde_json::json!({
                "most_severe_consequence": "missense_variant",
                "transcript_consequences": [
                    { "impact": "MODERATE", "consequence_terms": ["missense_variant"] }
                ]
            }))
            .unwrap())
        }

        fn schema_version(&self) -> &str {
            "15.8"
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl AnnotationStore for BrokenStore {
        async fn is_annotated(&self, _variant: &str) -> varanno_common::Result<bool> {
            Ok(false)
        }

        async fn save(&self, _variant: &str, _result: &AnnotationResult) -> varanno_common::Result<()> {
            Err(VarannoError::store("disk full"))
        }
    }

    /// Accepts saves but cannot make them durable.
    #[derive(Default)]
    struct UnflushableStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl AnnotationStore for UnflushableStore {
        async fn is_annotated(&self, variant: &str) -> varanno_common::Result<bool> {
            self.inner.is_annotated(variant).await
        }

        async fn save(&self, variant: &str, result: &AnnotationResult) -> varanno_common::Result<()> {
            self.inner.save(variant, result).await
        }

        async fn flush(&self) -> varanno_common::Result<()> {
            Err(VarannoError::store("read-only filesystem"))
        }
    }

    fn server_error() -> OracleError {
        OracleError::Status {
            status: 500,
            message: "Internal Server Error".to_string(),
        }
    }

    const VARIANTS: [&str; 5] = [
        "1:1000:A:G",
        "2:2000:C:T",
        "3:3000:G:A",
        "4:4000:T:C",
        "5:5000:A:C",
    ];

    fn job(oracle: Arc<ScriptedOracle>, store: Arc<dyn AnnotationStore>) -> EnrichmentJob {
        EnrichmentJob::new(AnnotationClient::new(oracle), store)
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_batch() {
        let oracle = Arc::new(ScriptedOracle::default().fail("3:3000:G:A", u32::MAX, server_error()));
        let store = Arc::new(MemoryStore::new());
        let job = job(oracle, store.clone()).with_retry_policy(RetryPolicy::none());

        let stats = job.enrich(&VARIANTS, None).await;

        assert_eq!(stats.processed, 5);
        assert_eq!(stats.succeeded, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].index, 2);
        assert_eq!(stats.failures[0].variant, "3:3000:G:A");
        assert_eq!(stats.failures[0].kind, "upstream_error");
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_annotated_items_skipped_without_permit() {
        let oracle = Arc::new(ScriptedOracle::default());
        let store = Arc::new(MemoryStore::new());
        let existing = AnnotationResult::new("synonymous_variant", Impact::Low, "15.8");
        for raw in VARIANTS {
            store.save(raw, &existing).await.unwrap();
        }

        let client = AnnotationClient::new(oracle.clone());
        let job = EnrichmentJob::new(client.clone(), store);
        let stats = job.enrich(&VARIANTS, None).await;

        assert_eq!(stats.skipped, 5);
        assert_eq!(stats.processed, 0);
        assert_eq!(oracle.calls(), 0);
        assert_eq!(client.rate_limiter().available(), 15);
    }

    #[tokio::test]
    async fn test_skip_matches_equivalent_spelling() {
        let oracle = Arc::new(ScriptedOracle::default());
        let store = Arc::new(MemoryStore::new());
        let job = job(oracle.clone(), store);

        job.enrich(&["chr17:41234470:t:a"], None).await;
        let stats = job.enrich(&["17-41234470-T-A"], None).await;

        assert_eq!(stats.skipped, 1);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_limit_excludes_skipped_items() {
        let oracle = Arc::new(ScriptedOracle::default());
        let store = Arc::new(MemoryStore::new());
        let existing = AnnotationResult::new("synonymous_variant", Impact::Low, "15.8");
        store.save(VARIANTS[0], &existing).await.unwrap();

        let stats = job(oracle.clone(), store).enrich(&VARIANTS, Some(2)).await;

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.processed, 2);
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_rerun_retries_only_failures() {
        let oracle = Arc::new(ScriptedOracle::default().fail("3:3000:G:A", 1, server_error()));
        let store = Arc::new(MemoryStore::new());
        let job = job(oracle.clone(), store).with_retry_policy(RetryPolicy::none());

        let first = job.enrich(&VARIANTS, None).await;
        assert_eq!(first.succeeded, 4);
        assert_eq!(first.failed, 1);

        let second = job.enrich(&VARIANTS, None).await;
        assert_eq!(second.skipped, 4);
        assert_eq!(second.processed, 1);
        assert_eq!(second.succeeded, 1);
        assert!(second.is_clean());
        assert_eq!(oracle.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried() {
        let oracle = Arc::new(ScriptedOracle::default().fail("1:1000:A:G", 2, server_error()));
        let store = Arc::new(MemoryStore::new());
        let job = job(oracle.clone(), store);

        let stats = job.enrich(&["1:1000:A:G"], None).await;

        assert_eq!(stats.succeeded, 1);
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let oracle = Arc::new(ScriptedOracle::default().fail("1:1000:A:G", u32::MAX, server_error()));
        let store = Arc::new(MemoryStore::new());
        let job = job(oracle.clone(), store).with_retry_policy(RetryPolicy {
            max_attempts: 4,
            ..RetryPolicy::default()
        });

        let stats = job.enrich(&["1:1000:A:G"], None).await;

        assert_eq!(stats.failed, 1);
        assert_eq!(oracle.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_hint_respected() {
        let oracle = Arc::new(ScriptedOracle::default().fail(
            "1:1000:A:G",
            1,
            OracleError::Throttled {
                retry_after: Some(Duration::from_secs(10)),
            },
        ));
        let store = Arc::new(MemoryStore::new());
        let job = job(oracle.clone(), store);

        let start = tokio::time::Instant::now();
        let stats = job.enrich(&["1:1000:A:G"], None).await;

        assert_eq!(stats.succeeded, 1);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_invalid_format_never_retried() {
        let oracle = Arc::new(ScriptedOracle::default());
        let store = Arc::new(MemoryStore::new());
        let job = job(oracle.clone(), store);

        let stats = job.enrich(&["not-a-variant", "1:1000:A:G"], None).await;

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failures[0].index, 0);
        assert_eq!(stats.failures[0].kind, "invalid_format");
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_item_failure() {
        let oracle = Arc::new(ScriptedOracle::default());
        let job = job(oracle, Arc::new(BrokenStore));

        let stats = job.enrich(&VARIANTS[..2], None).await;

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 2);
        assert!(stats.failures.iter().all(|f| f.kind == "store"));
    }

    #[tokio::test]
    async fn test_buffered_results_flushed_at_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let store = Arc::new(crate::store::JsonFileStore::open(&path).await.unwrap());
        let job = job(Arc::new(ScriptedOracle::default()), store);

        let stats = job.enrich(&VARIANTS, None).await;

        assert!(stats.is_clean());
        let reopened = crate::store::JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, VARIANTS.len());
    }

    #[tokio::test]
    async fn test_flush_failure_reported() {
        let job = job(Arc::new(ScriptedOracle::default()), Arc::new(UnflushableStore::default()));

        let stats = job.enrich(&VARIANTS[..2], None).await;

        assert_eq!(stats.succeeded, 2);
        assert!(!stats.is_clean());
        assert!(stats.store_error.unwrap().contains("read-only filesystem"));
    }

    #[tokio::test]
    async fn test_progress_reported_per_item() {
        let oracle = Arc::new(ScriptedOracle::default());
        let store = Arc::new(MemoryStore::new());
        store
            .save(VARIANTS[4], &AnnotationResult::new("intron_variant", Impact::Modifier, "15.8"))
            .await
            .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let job = job(oracle, store).on_progress(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        job.enrich(&VARIANTS, None).await;

        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(8), Duration::from_secs(1));

        let throttled = AnnotateError::UpstreamThrottled {
            retry_after: Some(Duration::from_millis(700)),
        };
        assert_eq!(policy.delay_for(1, &throttled), Duration::from_millis(700));
        assert_eq!(policy.delay_for(3, &throttled), Duration::from_millis(700));
        assert_eq!(policy.delay_for(4, &throttled), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        };

        let stalling = AnnotateError::UpstreamThrottled {
            retry_after: Some(Duration::from_secs(86_400)),
        };
        assert_eq!(policy.delay_for(1, &stalling), Duration::from_secs(2));

        let unhinted = AnnotateError::UpstreamThrottled { retry_after: None };
        assert_eq!(policy.delay_for(2, &unhinted), Duration::from_millis(200));
    }
}
