//! Injected storage for idempotency records.
//!
//! The process-wide record map sits behind the [`ReplayStore`] trait so the
//! single-process in-memory implementation can be swapped for a shared
//! external store without changing call sites. The one operation with a
//! correctness obligation is [`put_if_absent`](ReplayStore::put_if_absent):
//! it must be atomic, because two concurrent duplicates may both observe a
//! missing record before either writes.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

/// A captured outcome stored under an idempotency key.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    /// The opaque result of the protected action, replayed to duplicates.
    pub result: Value,
    /// When the record was written.
    pub created_at: Instant,
    /// How long the record is served before it expires.
    pub ttl: Duration,
}

impl IdempotencyRecord {
    /// Whether this record has outlived its TTL at `now`.
    pub fn expired_at(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// Keyed storage for idempotency records.
///
/// Implementations must make `put_if_absent` a single atomic insert, not a
/// read-then-write pair; first-writer-wins depends on it.
pub trait ReplayStore: Send + Sync {
    /// Returns the record for `key`, expired or not.
    ///
    /// Expiry is the manager's policy decision, so the store returns whatever
    /// it holds and lets the caller judge freshness.
    fn get(&self, key: &str) -> Option<IdempotencyRecord>;

    /// Stores `record` under `key` iff no live record exists.
    ///
    /// Returns `true` if this call inserted the record. An expired record may
    /// be replaced. Must be atomic per key.
    fn put_if_absent(&self, key: &str, record: IdempotencyRecord) -> bool;

    /// Removes the record for `key`, if any.
    fn remove(&self, key: &str);

    /// Drops every record whose TTL has elapsed at `now`.
    fn sweep_expired(&self, now: Instant);

    /// Removes all records.
    fn clear(&self);
}

/// In-process [`ReplayStore`] backed by a concurrent map.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
/// use formguard::{IdempotencyRecord, MemoryReplayStore, ReplayStore};
///
/// let store = MemoryReplayStore::new();
/// let record = IdempotencyRecord {
///     result: serde_json::json!({ "id": 7 }),
///     created_at: Instant::now(),
///     ttl: Duration::from_secs(60),
/// };
///
/// assert!(store.put_if_absent("key-1", record.clone()));
/// assert!(!store.put_if_absent("key-1", record));
/// ```
#[derive(Debug, Default)]
pub struct MemoryReplayStore {
    records: DashMap<String, IdempotencyRecord>,
}

impl MemoryReplayStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held (for inspection and tests).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ReplayStore for MemoryReplayStore {
    fn get(&self, key: &str) -> Option<IdempotencyRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    fn put_if_absent(&self, key: &str, record: IdempotencyRecord) -> bool {
        // The entry API holds the shard lock across the check and the write,
        // which is the critical section first-writer-wins relies on.
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expired_at(record.created_at) {
                    occupied.insert(record);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                true
            }
        }
    }

    fn remove(&self, key: &str) {
        self.records.remove(key);
    }

    fn sweep_expired(&self, now: Instant) {
        let before = self.records.len();
        self.records.retain(|_, record| !record.expired_at(now));
        let evicted = before.saturating_sub(self.records.len());
        if evicted > 0 {
            tracing::debug!(evicted, "swept expired idempotency records");
        }
    }

    fn clear(&self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(result: Value, ttl_secs: u64) -> IdempotencyRecord {
        IdempotencyRecord {
            result,
            created_at: Instant::now(),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    #[test]
    fn put_if_absent_first_writer_wins() {
        let store = MemoryReplayStore::new();

        assert!(store.put_if_absent("k", record(json!("first"), 60)));
        assert!(!store.put_if_absent("k", record(json!("second"), 60)));

        assert_eq!(store.get("k").unwrap().result, json!("first"));
    }

    #[test]
    fn expired_record_can_be_replaced() {
        let store = MemoryReplayStore::new();

        let mut stale = record(json!("stale"), 60);
        stale.created_at = Instant::now() - Duration::from_secs(120);
        assert!(store.put_if_absent("k", stale));

        assert!(store.put_if_absent("k", record(json!("fresh"), 60)));
        assert_eq!(store.get("k").unwrap().result, json!("fresh"));
    }

    #[test]
    fn remove_and_clear() {
        let store = MemoryReplayStore::new();
        store.put_if_absent("a", record(json!(1), 60));
        store.put_if_absent("b", record(json!(2), 60));

        store.remove("a");
        assert!(store.get("a").is_none());
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_drops_only_expired() {
        let store = MemoryReplayStore::new();
        let mut stale = record(json!("old"), 1);
        stale.created_at = Instant::now() - Duration::from_secs(10);
        store.put_if_absent("old", stale);
        store.put_if_absent("live", record(json!("new"), 600));

        store.sweep_expired(Instant::now());

        assert!(store.get("old").is_none());
        assert!(store.get("live").is_some());
    }

    #[test]
    fn concurrent_put_if_absent_admits_exactly_one() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        let store = Arc::new(MemoryReplayStore::new());
        let wins = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if store.put_if_absent("contested", record(json!(i), 60)) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
