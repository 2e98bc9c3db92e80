//! Rate limiting for request throttling
//!
//! Sliding window limiter keyed by client identity. Every call site may bring
//! its own limits; keys should carry the call-site scope so that windows of
//! different lengths never prune each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Trailing time window
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(3600),
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit config
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Create config for requests per second
    #[must_use]
    pub fn per_second(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(1))
    }

    /// Create config for requests per minute
    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Create config for requests per hour
    #[must_use]
    pub fn per_hour(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(3600))
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Time until the oldest counted request leaves the window
    pub reset_after: Duration,
    /// Current request count
    pub current: u32,
}

impl RateLimitResult {
    fn allowed(remaining: u32, reset_after: Duration, current: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_after,
            current,
        }
    }

    fn denied(reset_after: Duration, current: u32, max: u32) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_after,
            current: current.min(max),
        }
    }

    /// Seconds a rejected caller should wait, rounded up
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Convert a rejection into [`Error::RateLimited`].
    pub fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(Error::RateLimited {
                retry_after: Some(self.retry_after_secs()),
            })
        }
    }
}

/// Admitted request timestamps for one key, oldest first
#[derive(Debug)]
struct RateWindow {
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    fn new(window: Duration) -> Self {
        Self {
            window,
            timestamps: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn count_within(&self, now: Instant) -> u32 {
        self.timestamps
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count() as u32
    }

    fn reset_after(&self, now: Instant) -> Duration {
        self.timestamps
            .iter()
            .find(|t| now.duration_since(**t) < self.window)
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    }
}

/// In-memory rate limiter using a continuous sliding window
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Map of key -> admitted request timestamps
    windows: Arc<RwLock<HashMap<String, RateWindow>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default limits for [`acquire`](Self::acquire)
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Default limits
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Peek whether a request would be allowed, without recording it
    pub async fn check(&self, key: &str) -> RateLimitResult {
        let now = Instant::now();
        let max = self.config.max_requests;

        let windows = self.windows.read().await;
        let (current, reset_after) = match windows.get(key) {
            Some(w) => (w.count_within(now), w.reset_after(now)),
            None => (0, Duration::ZERO),
        };

        if current < max {
            RateLimitResult::allowed(max - current - 1, reset_after, current + 1)
        } else {
            RateLimitResult::denied(reset_after, current, max)
        }
    }

    /// Check and record in one operation using the default limits
    pub async fn acquire(&self, key: &str) -> RateLimitResult {
        let config = self.config;
        self.acquire_with(key, &config).await
    }

    /// Check and record in one operation using call-site limits.
    ///
    /// Prune, count and append happen under a single write lock, so two
    /// concurrent callers can never both be admitted past the limit.
    /// A rejected attempt is not recorded.
    pub async fn acquire_with(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        let now = Instant::now();
        let max = config.max_requests;

        let mut windows = self.windows.write().await;
        let entry = windows
            .entry(key.to_string())
            .or_insert_with(|| RateWindow::new(config.window));
        entry.window = config.window;
        entry.prune(now);

        let current = entry.timestamps.len() as u32;
        if current >= max {
            return RateLimitResult::denied(entry.reset_after(now), current, max);
        }

        entry.timestamps.push_back(now);
        RateLimitResult::allowed(max - current - 1, entry.reset_after(now), current + 1)
    }

    /// Admit or reject one request for `key` against `max_requests` per `window`
    pub async fn allow(&self, key: &str, max_requests: u32, window: Duration) -> bool {
        self.acquire_with(key, &RateLimitConfig::new(max_requests, window))
            .await
            .allowed
    }

    /// Get current usage for a key against the default limits
    pub async fn usage(&self, key: &str) -> (u32, u32) {
        let now = Instant::now();
        let windows = self.windows.read().await;
        let current = windows.get(key).map_or(0, |w| w.count_within(now));
        (current, self.config.max_requests)
    }

    /// Reset rate limit for a key
    pub async fn reset(&self, key: &str) {
        let mut windows = self.windows.write().await;
        windows.remove(key);
    }

    /// Number of keys currently tracked
    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }

    /// Drop keys with no requests left inside their window. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();

        let mut windows = self.windows.write().await;
        let initial_count = windows.len();

        windows.retain(|_, w| {
            w.prune(now);
            !w.timestamps.is_empty()
        });

        initial_count - windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
