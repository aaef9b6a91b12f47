//! Sliding-window rate limiter.
//!
//! A true rolling window rather than fixed buckets: a burst straddling a
//! bucket boundary can never double the effective rate. The active window is
//! recomputed on every check, so no background timer is required — the
//! limiter is safe to call from a stateless per-request handler.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};

/// Outcome of a single rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether this attempt may proceed.
    pub allowed: bool,
    /// Attempts left in the current window after this one.
    pub remaining: u32,
    /// For a denied attempt, how long until the oldest in-window timestamp
    /// leaves the window and a retry can succeed.
    pub retry_after: Option<Duration>,
}

/// Per-key sliding-window rate limiter.
///
/// One timestamp list is kept per distinct key (typically a client IP). On
/// every check the list is pruned to the rolling window before the attempt is
/// counted, so at the moment of any check a key can never hold more than
/// `max_requests` timestamps inside the window.
///
/// The per-key update runs under the map's entry lock, making the
/// read-prune-append sequence a critical section; concurrent checks at the
/// same key cannot lose entries.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use formguard::RateLimiter;
///
/// let limiter = RateLimiter::new(2, Duration::from_secs(60));
///
/// assert!(limiter.check("10.0.0.1").allowed);
/// assert!(limiter.check("10.0.0.1").allowed);
///
/// let denied = limiter.check("10.0.0.1");
/// assert!(!denied.allowed);
/// assert!(denied.retry_after.is_some());
/// ```
pub struct RateLimiter<C: Clock = SystemClock> {
    windows: DashMap<String, Vec<Instant>>,
    max_requests: u32,
    window: Duration,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Creates a limiter allowing `max_requests` attempts per rolling `window`.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_clock(max_requests, window, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Creates a limiter with a custom clock (used by tests to drive expiry).
    pub fn with_clock(max_requests: u32, window: Duration, clock: C) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            clock,
        }
    }

    /// Checks whether `key` may attempt a submission now, using the limiter's
    /// configured limit and window.
    ///
    /// On an allowed attempt the current instant is recorded against the key.
    /// A denied attempt records nothing.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_with(key, self.max_requests, self.window)
    }

    /// Checks `key` against an explicit limit and window.
    ///
    /// Prunes timestamps older than `now - window`, then either records the
    /// attempt (allowed) or reports how long until the oldest in-window
    /// timestamp expires (denied).
    pub fn check_with(&self, key: &str, max_requests: u32, window: Duration) -> RateLimitDecision {
        let now = self.clock.now();

        let mut entry = self.windows.entry(key.to_string()).or_default();
        let timestamps = entry.value_mut();

        // Recompute the active window on every check.
        timestamps.retain(|t| now.duration_since(*t) < window);

        if (timestamps.len() as u32) < max_requests {
            timestamps.push(now);
            return RateLimitDecision {
                allowed: true,
                remaining: max_requests - timestamps.len() as u32,
                retry_after: None,
            };
        }

        let oldest = timestamps.first().copied().unwrap_or(now);
        let retry_after = (oldest + window).saturating_duration_since(now);
        tracing::debug!(key, max_requests, "rate limit exceeded");

        RateLimitDecision {
            allowed: false,
            remaining: 0,
            retry_after: Some(retry_after.max(Duration::from_secs(1))),
        }
    }

    /// Unconditionally clears all timestamps for `key`.
    ///
    /// An unknown key is not an error; it already behaves as an empty window.
    pub fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    /// Removes entries whose windows are empty, to bound memory growth.
    ///
    /// Only exact-empty entries are evicted, so a sweep can never affect the
    /// correctness of a concurrent check at the same key.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let window = self.window;
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < window);
            !timestamps.is_empty()
        });
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            tracing::debug!(evicted, "swept empty rate-limit entries");
        }
    }

    /// Number of keys currently tracked (for inspection and tests).
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
