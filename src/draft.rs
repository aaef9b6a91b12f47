//! Draft persistence: protects in-progress form data against reloads and
//! crashes.
//!
//! The manager mirrors a browser-side autosave loop: per-keystroke saves are
//! debounced into periodic writes, an `immediate` save bypasses the debounce
//! for critical moments (navigating away), and the draft is cleared exactly
//! once after a submission is confirmed successful.
//!
//! Storage failures are expected (quota, privacy mode) and always fail soft:
//! the form keeps working without autosave, and nothing here panics or
//! returns an error to the caller.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{StorageError, StorageErrorKind};

/// A saved draft for one form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFormState {
    /// Which form this draft belongs to.
    pub form_id: String,
    /// Field values at save time.
    pub data: BTreeMap<String, String>,
    /// Wall-clock save time, milliseconds since the Unix epoch.
    pub saved_at_ms: u64,
}

/// Inspection data for a saved draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftInfo {
    /// Wall-clock save time, milliseconds since the Unix epoch.
    pub saved_at_ms: u64,
    /// Age of the draft in whole minutes.
    pub age_minutes: u64,
}

/// Key-value backend for draft payloads, keyed by form id.
///
/// Models browser local storage: string payloads, and any operation may fail
/// when storage is inaccessible. Callers treat every error as absence.
pub trait DraftStore: Send + Sync {
    /// Reads the payload for `form_id`.
    fn read(&self, form_id: &str) -> Result<Option<String>, StorageError>;
    /// Writes the payload for `form_id`, replacing any existing one.
    fn write(&self, form_id: &str, payload: &str) -> Result<(), StorageError>;
    /// Removes the payload for `form_id`, if any.
    fn remove(&self, form_id: &str) -> Result<(), StorageError>;
}

/// In-memory [`DraftStore`], used in tests and headless environments.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    entries: DashMap<String, String>,
}

impl MemoryDraftStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DraftStore for MemoryDraftStore {
    fn read(&self, form_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(form_id).map(|e| e.value().clone()))
    }

    fn write(&self, form_id: &str, payload: &str) -> Result<(), StorageError> {
        self.entries.insert(form_id.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&self, form_id: &str) -> Result<(), StorageError> {
        self.entries.remove(form_id);
        Ok(())
    }
}

struct PendingSave {
    data: BTreeMap<String, String>,
    due: Instant,
}

/// Autosave manager for one form's draft.
///
/// Storage is scoped per `form_id`, so independent forms on the same origin
/// never collide. Debounced saves are deadline-based and deterministic: the
/// host calls [`flush_due`](FormStateManager::flush_due) on its tick (or
/// [`save_state`](FormStateManager::save_state) with `immediate = true`
/// before unload), never racing an ad hoc timer.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use std::time::Duration;
/// use formguard::{FormStateManager, MemoryDraftStore};
///
/// let manager = FormStateManager::new(
///     "contact-form",
///     MemoryDraftStore::new(),
///     Duration::from_secs(2),
/// );
///
/// let mut data = BTreeMap::new();
/// data.insert("name".to_string(), "John".to_string());
/// manager.save_state(&data, true);
///
/// assert_eq!(manager.restore_state(), Some(data));
/// manager.clear_state();
/// assert_eq!(manager.restore_state(), None);
/// ```
pub struct FormStateManager<S: DraftStore = MemoryDraftStore, C: Clock = SystemClock> {
    form_id: String,
    store: S,
    debounce: Duration,
    pending: Mutex<Option<PendingSave>>,
    clock: C,
}

impl<S: DraftStore> FormStateManager<S, SystemClock> {
    /// Creates a manager for `form_id` over `store`.
    pub fn new(form_id: impl Into<String>, store: S, debounce: Duration) -> Self {
        Self::with_clock(form_id, store, debounce, SystemClock)
    }
}

impl<S: DraftStore, C: Clock> FormStateManager<S, C> {
    /// Creates a manager with a custom clock (used by tests to drive the
    /// debounce deadline).
    pub fn with_clock(form_id: impl Into<String>, store: S, debounce: Duration, clock: C) -> Self {
        Self {
            form_id: form_id.into(),
            store,
            debounce,
            pending: Mutex::new(None),
            clock,
        }
    }

    /// Persists the current field values.
    ///
    /// With `immediate = false` the write is debounced: the pending save is
    /// replaced and its deadline re-armed, so a keystroke burst costs one
    /// write. With `immediate = true` any pending save is cancelled and the
    /// data is written now.
    pub fn save_state(&self, data: &BTreeMap<String, String>, immediate: bool) {
        if immediate {
            self.cancel_pending();
            self.write_now(data.clone());
        } else {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            *pending = Some(PendingSave {
                data: data.clone(),
                due: self.clock.now() + self.debounce,
            });
        }
    }

    /// Scheduler tick: writes the pending save if its deadline has passed.
    ///
    /// Returns `true` if a write happened.
    pub fn flush_due(&self) -> bool {
        let due_save = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            match &*pending {
                Some(save) if self.clock.now() >= save.due => pending.take(),
                _ => None,
            }
        };
        match due_save {
            Some(save) => {
                self.write_now(save.data);
                true
            }
            None => false,
        }
    }

    /// Writes any pending save immediately, regardless of its deadline.
    pub fn flush_now(&self) -> bool {
        let pending = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .take();
        match pending {
            Some(save) => {
                self.write_now(save.data);
                true
            }
            None => false,
        }
    }

    /// Discards a pending debounced save without writing it.
    pub fn cancel_pending(&self) {
        self.pending.lock().expect("pending lock poisoned").take();
    }

    /// Whether a draft currently exists for this form.
    pub fn has_saved_state(&self) -> bool {
        self.load().is_some()
    }

    /// Returns the saved draft's timestamp and age, without mutating it.
    pub fn get_saved_state_info(&self) -> Option<DraftInfo> {
        let state = self.load()?;
        let now = self.clock.unix_millis();
        let age_minutes = now.saturating_sub(state.saved_at_ms) / 60_000;
        Some(DraftInfo {
            saved_at_ms: state.saved_at_ms,
            age_minutes,
        })
    }

    /// Returns the most recently saved draft, or `None` if absent or cleared.
    pub fn restore_state(&self) -> Option<BTreeMap<String, String>> {
        self.load().map(|state| state.data)
    }

    /// Deletes the draft and cancels any pending debounced save.
    ///
    /// Call exactly once, immediately after a submission is confirmed
    /// successful — clearing on a merely-attempted submission risks losing a
    /// draft whose submission later fails. Cancelling the pending save here
    /// keeps a stale autosave from resurrecting the cleared draft.
    pub fn clear_state(&self) {
        self.cancel_pending();
        if let Err(error) = self.store.remove(&self.form_id) {
            tracing::warn!(form_id = %self.form_id, %error, "draft clear failed; continuing without autosave");
        }
    }

    fn write_now(&self, data: BTreeMap<String, String>) {
        let state = SavedFormState {
            form_id: self.form_id.clone(),
            data,
            saved_at_ms: self.clock.unix_millis(),
        };
        let payload = match serde_json::to_string(&state) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(form_id = %self.form_id, %error, "draft serialization failed");
                return;
            }
        };
        if let Err(error) = self.store.write(&self.form_id, &payload) {
            tracing::warn!(form_id = %self.form_id, %error, "draft save failed; continuing without autosave");
        }
    }

    fn load(&self) -> Option<SavedFormState> {
        let payload = match self.store.read(&self.form_id) {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(form_id = %self.form_id, %error, "draft read failed; treating as absent");
                return None;
            }
        };
        match serde_json::from_str::<SavedFormState>(&payload) {
            Ok(state) => Some(state),
            Err(error) => {
                let corrupted =
                    StorageError::new(StorageErrorKind::Corrupted, error.to_string());
                tracing::warn!(form_id = %self.form_id, %corrupted, "draft payload unreadable; treating as absent");
                None
            }
        }
    }
}
