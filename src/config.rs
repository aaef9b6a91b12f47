//! Pipeline configuration.

use std::time::Duration;

/// Fully-enumerated tunables for the submission pipeline.
///
/// Every recognized knob is a named field so call sites show exactly what is
/// being configured; there is no free-form options bag.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use formguard::PipelineConfig;
///
/// let config = PipelineConfig {
///     max_requests: 10,
///     window: Duration::from_secs(60),
///     ..PipelineConfig::default()
/// };
/// assert_eq!(config.max_requests, 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum submission attempts per caller key per rolling window.
    pub max_requests: u32,
    /// Length of the rolling rate-limit window.
    pub window: Duration,
    /// How long a recorded idempotency result is replayed before it expires.
    pub idempotency_ttl: Duration,
    /// Quiet period before a non-immediate draft autosave is written.
    pub autosave_debounce: Duration,
}

impl Default for PipelineConfig {
    /// Production defaults: 5 attempts per 15 minutes, 60 second replay
    /// window, 2 second autosave debounce.
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(15 * 60),
            idempotency_ttl: Duration::from_secs(60),
            autosave_debounce: Duration::from_secs(2),
        }
    }
}
