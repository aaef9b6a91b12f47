//! Time sources for the rate limiter, idempotency TTLs, and autosave debounce.
//!
//! All time-dependent components take a [`Clock`] so tests can drive expiry
//! and debounce deadlines deterministically instead of sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of monotonic and wall-clock time.
///
/// Monotonic [`Instant`]s drive window pruning, TTL expiry, and debounce
/// deadlines. Wall-clock milliseconds are only needed where a timestamp must
/// survive serialization (saved drafts report their age to the user).
///
/// # Examples
///
/// ```
/// use formguard::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let a = clock.now();
/// let b = clock.now();
/// assert!(b >= a);
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time as milliseconds since the Unix epoch.
    ///
    /// The default implementation reads the system clock. Manual clocks
    /// override this so draft timestamps are controllable in tests.
    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock backed by the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually-advanced clock for deterministic tests.
///
/// Time only moves when [`advance`](ManualClock::advance) is called, so tests
/// can expire rate-limit windows, idempotency records, and debounce deadlines
/// without sleeping.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use formguard::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(60));
/// assert_eq!(clock.now() - start, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
    epoch_millis: Arc<Mutex<u64>>,
}

impl ManualClock {
    /// Creates a manual clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            epoch_millis: Arc::new(Mutex::new(0)),
        }
    }

    /// Advances both the monotonic and wall-clock views by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut elapsed = self.elapsed.lock().expect("clock lock poisoned");
        *elapsed += delta;
        let mut millis = self.epoch_millis.lock().expect("clock lock poisoned");
        *millis += delta.as_millis() as u64;
    }

    /// Sets the wall-clock view to an absolute millisecond timestamp.
    pub fn set_unix_millis(&self, millis: u64) {
        *self.epoch_millis.lock().expect("clock lock poisoned") = millis;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().expect("clock lock poisoned")
    }

    fn unix_millis(&self) -> u64 {
        *self.epoch_millis.lock().expect("clock lock poisoned")
    }
}
