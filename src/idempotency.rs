//! Exactly-once execution of a protected action under an idempotency key.
//!
//! A retried submission (same logical request resent by a flaky client) must
//! execute the protected action at most once, and every caller — original or
//! retry — must observe the same captured outcome until the record's TTL
//! elapses.
//!
//! Two layers cooperate:
//! - completed outcomes live in a [`ReplayStore`] keyed by idempotency key,
//!   written with an atomic insert-if-absent (first-writer-wins);
//! - attempts that arrive while the action is still running park on an
//!   in-flight slot and receive the claimant's result when it lands, so even
//!   a duplicate sent before the first response is known cannot re-execute
//!   the action.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::clock::{Clock, SystemClock};
use crate::store::{IdempotencyRecord, MemoryReplayStore, ReplayStore};

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Derives a stable content fingerprint from already-sanitized field values.
///
/// Two submissions with identical content hash to the same key, which lets a
/// server deduplicate resends that arrive without a client-supplied key.
///
/// # Examples
///
/// ```
/// use formguard::fingerprint;
///
/// let a = fingerprint(&["john@example.com", "Wedding", "2026-12-31"]);
/// let b = fingerprint(&["john@example.com", "Wedding", "2026-12-31"]);
/// assert_eq!(a, b);
/// ```
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // Field separator so ["ab","c"] and ["a","bc"] differ.
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Result of [`IdempotencyManager::run_once`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// The captured result of the protected action.
    pub result: Value,
    /// `true` if this call replayed a prior execution instead of running the
    /// action itself.
    pub replayed: bool,
}

enum FlightState {
    Running,
    Finished(Value),
    Failed,
}

struct FlightSlot {
    state: Mutex<FlightState>,
    done: Condvar,
}

impl FlightSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Running),
            done: Condvar::new(),
        }
    }

    fn publish(&self, state: FlightState) {
        *self.state.lock().expect("flight slot lock poisoned") = state;
        self.done.notify_all();
    }

    /// Blocks until the claimant publishes, returning the finished result or
    /// `None` if the claimant failed.
    fn await_result(&self) -> Option<Value> {
        let mut state = self.state.lock().expect("flight slot lock poisoned");
        loop {
            match &*state {
                FlightState::Running => {
                    state = self
                        .done
                        .wait(state)
                        .expect("flight slot lock poisoned");
                }
                FlightState::Finished(result) => return Some(result.clone()),
                FlightState::Failed => return None,
            }
        }
    }
}

/// Deduplicates logically-identical submission attempts.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use formguard::IdempotencyManager;
/// use serde_json::json;
///
/// let manager = IdempotencyManager::new(Duration::from_secs(60));
/// let key = manager.generate_key();
///
/// assert!(!manager.is_processed(&key));
/// manager.mark_processed(&key, json!({ "lead_id": 42 }));
/// assert!(manager.is_processed(&key));
/// assert_eq!(manager.get_result(&key), Some(json!({ "lead_id": 42 })));
/// ```
pub struct IdempotencyManager<S: ReplayStore = MemoryReplayStore, C: Clock = SystemClock> {
    store: S,
    in_flight: DashMap<String, Arc<FlightSlot>>,
    ttl: Duration,
    clock: C,
}

impl IdempotencyManager<MemoryReplayStore, SystemClock> {
    /// Creates a manager with an in-memory store and the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_parts(MemoryReplayStore::new(), SystemClock, ttl)
    }
}

impl<S: ReplayStore, C: Clock> IdempotencyManager<S, C> {
    /// Creates a manager over an injected store and clock.
    pub fn with_parts(store: S, clock: C, ttl: Duration) -> Self {
        Self {
            store,
            in_flight: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Produces a collision-resistant, unguessable key for a new logical
    /// request. The client tags one attempt and all its retries with it.
    pub fn generate_key(&self) -> String {
        let entropy: [u8; 16] = rand::random();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let counter = KEY_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(entropy);
        hasher.update(nanos.to_le_bytes());
        hasher.update(counter.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// True iff a record exists for `key` and has not expired.
    pub fn is_processed(&self, key: &str) -> bool {
        self.live_record(key).is_some()
    }

    /// Stores `result` under `key` with the configured TTL.
    ///
    /// First-writer-wins: if a live record already exists, the original
    /// result is kept and this call returns `false`.
    pub fn mark_processed(&self, key: &str, result: Value) -> bool {
        let record = IdempotencyRecord {
            result,
            created_at: self.clock.now(),
            ttl: self.ttl,
        };
        self.store.put_if_absent(key, record)
    }

    /// Returns the stored result for replay, or `None` if absent or expired.
    pub fn get_result(&self, key: &str) -> Option<Value> {
        self.live_record(key).map(|record| record.result)
    }

    /// Administrative per-key eviction.
    pub fn reset(&self, key: &str) {
        self.store.remove(key);
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// TTL housekeeping: drops expired records.
    pub fn sweep_expired(&self) {
        self.store.sweep_expired(self.clock.now());
    }

    /// Executes `action` at most once for `key`.
    ///
    /// A completed record is replayed without running the action. An attempt
    /// arriving while another attempt for the same key is mid-action blocks
    /// until that attempt finishes and receives its result. Only an actual
    /// execution writes a record: if `action` returns an error, nothing is
    /// stored and the error propagates, so a retry re-executes.
    pub fn run_once<F, E>(&self, key: &str, action: F) -> Result<RunOutcome, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        loop {
            if let Some(record) = self.live_record(key) {
                return Ok(RunOutcome {
                    result: record.result,
                    replayed: true,
                });
            }

            let slot = match self.in_flight.entry(key.to_string()) {
                Entry::Vacant(vacant) => {
                    let slot = Arc::new(FlightSlot::new());
                    vacant.insert(Arc::clone(&slot));
                    return self.execute(key, slot, action);
                }
                Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            };

            // Another attempt owns the execution; take its result when it
            // lands. If it failed, loop and contend for ownership again.
            if let Some(result) = slot.await_result() {
                return Ok(RunOutcome {
                    result,
                    replayed: true,
                });
            }
        }
    }

    fn execute<F, E>(&self, key: &str, slot: Arc<FlightSlot>, action: F) -> Result<RunOutcome, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        // Re-check under ownership: a previous claimant may have recorded a
        // result between our store miss and our claim.
        if let Some(record) = self.live_record(key) {
            slot.publish(FlightState::Finished(record.result.clone()));
            self.in_flight.remove(key);
            return Ok(RunOutcome {
                result: record.result,
                replayed: true,
            });
        }

        match action() {
            Ok(result) => {
                // Record before releasing the slot so later attempts find it.
                self.mark_processed(key, result.clone());
                slot.publish(FlightState::Finished(result.clone()));
                self.in_flight.remove(key);
                Ok(RunOutcome {
                    result,
                    replayed: false,
                })
            }
            Err(error) => {
                tracing::debug!(key, "protected action failed; no record written");
                slot.publish(FlightState::Failed);
                self.in_flight.remove(key);
                Err(error)
            }
        }
    }

    fn live_record(&self, key: &str) -> Option<IdempotencyRecord> {
        let record = self.store.get(key)?;
        if record.expired_at(self.clock.now()) {
            return None;
        }
        Some(record)
    }
}
