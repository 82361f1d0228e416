//! Process-wide sliding-window rate limiter for upstream calls
//!
//! At most `max_permits` permits are granted in any rolling `window`. Callers
//! queue on a FIFO-fair async mutex, so permits are handed out in arrival
//! order and a waiting caller never lets a later one jump ahead.
//!
//! A permit is consumed when granted; there is nothing to return. Dropping an
//! `acquire` future before it resolves leaves the window untouched.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default number of upstream requests per window.
pub const DEFAULT_MAX_PERMITS: usize = 15;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Rate limiting configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Permits allowed per window
    pub max_permits: usize,
    /// Rolling window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_permits: DEFAULT_MAX_PERMITS,
            window: DEFAULT_WINDOW,
        }
    }
}

impl RateLimitConfig {
    pub fn per_second(max_permits: usize) -> Self {
        Self {
            max_permits,
            window: Duration::from_secs(1),
        }
    }
}

/// Proof that a request may be issued now.
#[derive(Debug, Clone, Copy)]
pub struct Permit {
    granted_at: Instant,
}

impl Permit {
    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }
}

#[derive(Debug)]
struct Inner {
    config: RateLimitConfig,
    /// Grant instants inside the current window, oldest first.
    grants: Mutex<VecDeque<Instant>>,
}

/// Shared rate limiter. Clones share one window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// A zero permit budget would block forever, so it is raised to one.
    pub fn new(config: RateLimitConfig) -> Self {
        let config = RateLimitConfig {
            max_permits: config.max_permits.max(1),
            ..config
        };

        Self {
            inner: Arc::new(Inner {
                config,
                grants: Mutex::new(VecDeque::with_capacity(config.max_permits)),
            }),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.inner.config
    }

    fn prune(&self, grants: &mut VecDeque<Instant>, now: Instant) {
        let window = self.inner.config.window;
        while let Some(&oldest) = grants.front() {
            if now.saturating_duration_since(oldest) >= window {
                grants.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait for a permit.
    ///
    /// The queue lock is held while sleeping, so callers behind this one
    /// stay queued in arrival order.
    pub async fn acquire(&self) -> Permit {
        let mut grants = self.inner.grants.lock().await;

        loop {
            let now = Instant::now();
            self.prune(&mut grants, now);

            if grants.len() < self.inner.config.max_permits {
                grants.push_back(now);
                return Permit { granted_at: now };
            }

            let Some(&oldest) = grants.front() else {
                continue;
            };
            let ready_at = oldest + self.inner.config.window;
            debug!(
                wait_ms = ready_at.saturating_duration_since(now).as_millis() as u64,
                "Rate limit reached, waiting for window to roll"
            );
            tokio::time::sleep_until(ready_at).await;
        }
    }

    /// Take a permit only if one is free right now and nobody is queued.
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut grants = self.inner.grants.try_lock().ok()?;
        let now = Instant::now();
        self.prune(&mut grants, now);

        if grants.len() < self.inner.config.max_permits {
            grants.push_back(now);
            Some(Permit { granted_at: now })
        } else {
            None
        }
    }

    /// Permits that could be granted immediately, as of the call.
    ///
    /// Never waits. While a caller is queued behind a full window nothing can
    /// be granted immediately, so this reports zero.
    pub fn available(&self) -> usize {
        let Ok(mut grants) = self.inner.grants.try_lock() else {
            return 0;
        };
        self.prune(&mut grants, Instant::now());
        self.inner.config.max_permits - grants.len()
    }
}
