//! Resilient form-submission pipeline for public lead/contact forms.
//!
//! Guards a single externally-supplied "submit" action with four cooperating
//! gates, plus a client-side draft manager:
//! - [`RateLimiter`]: at most N attempts per caller key per rolling window
//! - sanitization ([`sanitize_string`] and friends): strips script-executing
//!   markup and normalizes fields, with advisory injection-pattern flagging
//! - validation ([`validate_contact_form`]): hard errors block, soft
//!   warnings surface to the user without blocking
//! - [`IdempotencyManager`]: retries of one logical request execute the
//!   protected action at most once and replay the original result
//! - [`FormStateManager`]: debounced draft autosave so a reload or crash
//!   never destroys user input
//!
//! # Examples
//!
//! ```
//! use formguard::{ContactForm, PipelineConfig, SubmissionOutcome, SubmissionPipeline, SubmissionRequest};
//! use serde_json::json;
//!
//! let pipeline = SubmissionPipeline::new(PipelineConfig::default());
//!
//! let request = SubmissionRequest {
//!     caller_key: "203.0.113.9".into(),
//!     idempotency_key: pipeline.generate_key(),
//!     form: ContactForm {
//!         name: "John Doe".into(),
//!         email: "john@example.com".into(),
//!         phone: "(901) 555-1234".into(),
//!         event_type: "Wedding".into(),
//!         ..ContactForm::default()
//!     },
//! };
//!
//! // The closure is the protected action — e.g., the lead insert.
//! let outcome = pipeline
//!     .submit::<_, ()>(request, |form| Ok(json!({ "lead": form.email })))
//!     .unwrap();
//! assert!(matches!(outcome, SubmissionOutcome::Accepted { .. }));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod draft;
mod error;
mod idempotency;
mod pipeline;
mod rate_limit;
mod sanitize;
mod store;
mod validate;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PipelineConfig;
pub use draft::{DraftInfo, DraftStore, FormStateManager, MemoryDraftStore, SavedFormState};
pub use error::{StorageError, StorageErrorKind};
pub use idempotency::{fingerprint, IdempotencyManager, RunOutcome};
pub use pipeline::{SubmissionOutcome, SubmissionPipeline, SubmissionRequest};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use sanitize::{has_suspicious_patterns, sanitize_email, sanitize_phone, sanitize_string};
pub use store::{IdempotencyRecord, MemoryReplayStore, ReplayStore};
pub use validate::{
    format_phone, validate_contact_form, validate_contact_form_on, validate_email,
    validate_event_date, validate_location, validate_message, validate_name, validate_phone,
    ContactForm, EventDateRules, FieldCheck, ValidationReport,
};
