//! In-process annotation cache
//!
//! Maps canonical variant keys to previously fetched annotations. Entries
//! expire after their TTL and are evicted lazily on read or in bulk with
//! [`ResponseCache::purge_expired`].
//!
//! Time is read from `tokio::time::Instant`, so tests can drive expiry with a
//! paused runtime clock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use varanno_common::AnnotationResult;

/// Default cache TTL (24 hours).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    result: AnnotationResult,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) < self.ttl
    }
}

/// Shared, thread-safe annotation cache.
///
/// Cloning is cheap and every clone sees the same entries.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    default_ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl ResponseCache {
    /// Create an empty cache whose [`insert`](Self::insert) uses `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // Entries are only inserted or removed whole, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up an unexpired entry. Expired entries count as a miss and are
    /// removed.
    pub fn get(&self, key: &str) -> Option<AnnotationResult> {
        let now = Instant::now();

        {
            let entries = self.read();
            match entries.get(key) {
                Some(entry) if entry.is_fresh(now) => {
                    debug!(key = %key, "Cache hit");
                    return Some(entry.result.clone());
                },
                Some(_) => {},
                None => {
                    debug!(key = %key, "Cache miss");
                    return None;
                },
            }
        }

        // Re-check under the write lock: a concurrent put may have refreshed it.
        let mut entries = self.write();
        if let Some(entry) = entries.get(key) {
            if entry.is_fresh(now) {
                return Some(entry.result.clone());
            }
            entries.remove(key);
            debug!(key = %key, "Cache entry expired");
        }
        None
    }

    /// Store a result under `key` for `ttl`, replacing any previous entry.
    pub fn put(&self, key: impl Into<String>, result: AnnotationResult, ttl: Duration) {
        let key = key.into();
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached annotation");

        self.write().insert(
            key,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Store a result with the cache's default TTL.
    pub fn insert(&self, key: impl Into<String>, result: AnnotationResult) {
        self.put(key, result, self.default_ttl);
    }

    pub fn remove(&self, key: &str) -> Option<AnnotationResult> {
        self.write().remove(key).map(|entry| entry.result)
    }

    /// Drop every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.write();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Remove expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        let removed = before - entries.len();

        if removed > 0 {
            debug!(count = removed, "Purged expired cache entries");
        }
        removed
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.read();
        let valid = entries.values().filter(|e| e.is_fresh(now)).count();

        CacheStats {
            total_entries: entries.len(),
            expired_entries: entries.len() - valid,
            valid_entries: valid,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub valid_entries: usize,
}
