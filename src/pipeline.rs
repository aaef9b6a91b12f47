//! The composed submission pipeline.
//!
//! Wraps one externally-supplied "submit" action with four gates, in order:
//! rate limit (by caller key) → sanitize → validate → idempotency (by request
//! key). Only when every gate passes does the protected action run, and its
//! result is captured for replay to retries. Gate failures are structured
//! outcomes, never errors: on a public form they are expected, frequent
//! events.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::idempotency::IdempotencyManager;
use crate::rate_limit::RateLimiter;
use crate::sanitize::{has_suspicious_patterns, sanitize_email, sanitize_phone, sanitize_string};
use crate::store::{MemoryReplayStore, ReplayStore};
use crate::validate::{validate_contact_form, ContactForm};

/// One submission attempt as received from the HTTP handler.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    /// Caller identity used for rate limiting (typically the client IP).
    pub caller_key: String,
    /// Idempotency key identifying this logical request across retries.
    /// Client-supplied, or server-generated on the first attempt.
    pub idempotency_key: String,
    /// Raw field values.
    pub form: ContactForm,
}

/// Outcome of a submission attempt.
///
/// The handler translates these into HTTP status codes (429, 400, 200/201).
/// A `Duplicate` is not an error: it is a successful replay of a prior
/// result, indistinguishable to the user from the original success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Too many attempts from this caller; retry after the given delay.
    RateLimited {
        /// Time until a retry can succeed.
        retry_after: Duration,
    },
    /// The form failed validation; `errors` says which fields and why.
    Invalid {
        /// Hard failures per field.
        errors: BTreeMap<String, String>,
        /// Advisory messages per field.
        warnings: BTreeMap<String, String>,
    },
    /// Replay of a previously-executed identical attempt.
    Duplicate {
        /// The original captured result.
        result: Value,
    },
    /// The protected action ran now.
    Accepted {
        /// The action's captured result.
        result: Value,
        /// Advisory messages per field (never blocking).
        warnings: BTreeMap<String, String>,
        /// Fields that tripped the advisory injection-pattern detector.
        suspicious_fields: Vec<String>,
    },
}

/// The resilient form-submission pipeline.
///
/// Holds the process-wide gate state (rate-limit windows and idempotency
/// records); construct one per process and share it across requests.
///
/// # Examples
///
/// ```
/// use formguard::{ContactForm, PipelineConfig, SubmissionOutcome, SubmissionPipeline, SubmissionRequest};
/// use serde_json::json;
///
/// let pipeline = SubmissionPipeline::new(PipelineConfig::default());
///
/// let request = SubmissionRequest {
///     caller_key: "203.0.113.9".into(),
///     idempotency_key: pipeline.generate_key(),
///     form: ContactForm {
///         name: "John Doe".into(),
///         email: "john@example.com".into(),
///         phone: "(901) 555-1234".into(),
///         event_type: "Wedding".into(),
///         ..ContactForm::default()
///     },
/// };
///
/// let outcome = pipeline
///     .submit::<_, ()>(request, |form| Ok(json!({ "lead": form.email })))
///     .unwrap();
/// assert!(matches!(outcome, SubmissionOutcome::Accepted { .. }));
/// ```
pub struct SubmissionPipeline<S: ReplayStore = MemoryReplayStore, C: Clock = SystemClock> {
    rate_limiter: RateLimiter<C>,
    idempotency: IdempotencyManager<S, C>,
}

impl SubmissionPipeline<MemoryReplayStore, SystemClock> {
    /// Creates a pipeline with in-memory stores and the system clock.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_parts(config, MemoryReplayStore::new(), SystemClock)
    }
}

impl<S: ReplayStore, C: Clock + Clone> SubmissionPipeline<S, C> {
    /// Creates a pipeline over an injected replay store and clock.
    pub fn with_parts(config: PipelineConfig, store: S, clock: C) -> Self {
        Self {
            rate_limiter: RateLimiter::with_clock(
                config.max_requests,
                config.window,
                clock.clone(),
            ),
            idempotency: IdempotencyManager::with_parts(store, clock, config.idempotency_ttl),
        }
    }
}

impl<S: ReplayStore, C: Clock> SubmissionPipeline<S, C> {
    /// Generates an idempotency key for a new logical request.
    pub fn generate_key(&self) -> String {
        self.idempotency.generate_key()
    }

    /// Runs one submission attempt through the gates.
    ///
    /// `action` is the protected side effect (typically the lead insert). It
    /// runs at most once per idempotency key; a duplicate attempt — even one
    /// racing the original — receives the original's result. An `Err` from
    /// the action propagates unchanged and writes no idempotency record, so
    /// the client may retry.
    pub fn submit<F, E>(&self, request: SubmissionRequest, action: F) -> Result<SubmissionOutcome, E>
    where
        F: FnOnce(&ContactForm) -> Result<Value, E>,
    {
        let decision = self.rate_limiter.check(&request.caller_key);
        if !decision.allowed {
            return Ok(SubmissionOutcome::RateLimited {
                retry_after: decision.retry_after.unwrap_or(Duration::from_secs(1)),
            });
        }

        let (clean, suspicious_fields) = sanitize_form(&request.form);

        let report = validate_contact_form(&clean);
        if !report.valid {
            return Ok(SubmissionOutcome::Invalid {
                errors: report.errors,
                warnings: report.warnings,
            });
        }

        if !suspicious_fields.is_empty() {
            tracing::warn!(
                caller = %request.caller_key,
                fields = ?suspicious_fields,
                "submission flagged by pattern detector; proceeding (advisory)"
            );
        }

        let run = self
            .idempotency
            .run_once(&request.idempotency_key, || action(&clean))?;

        if run.replayed {
            Ok(SubmissionOutcome::Duplicate { result: run.result })
        } else {
            Ok(SubmissionOutcome::Accepted {
                result: run.result,
                warnings: report.warnings,
                suspicious_fields,
            })
        }
    }

    /// Clears the rate-limit window for a caller (administrative).
    pub fn reset_rate_limit(&self, caller_key: &str) {
        self.rate_limiter.reset(caller_key);
    }

    /// Evicts empty rate-limit windows and expired idempotency records.
    pub fn sweep(&self) {
        self.rate_limiter.sweep();
        self.idempotency.sweep_expired();
    }

    /// The rate limiter gate (for direct inspection).
    pub fn rate_limiter(&self) -> &RateLimiter<C> {
        &self.rate_limiter
    }

    /// The idempotency gate (for direct inspection).
    pub fn idempotency(&self) -> &IdempotencyManager<S, C> {
        &self.idempotency
    }
}

/// Sanitizes every field and reports which ones look like injection probes.
fn sanitize_form(form: &ContactForm) -> (ContactForm, Vec<String>) {
    let mut suspicious = Vec::new();
    let mut flag = |field: &str, raw: &str| {
        if has_suspicious_patterns(raw) {
            suspicious.push(field.to_string());
        }
    };

    flag("name", &form.name);
    flag("message", form.message.as_deref().unwrap_or(""));
    flag("location", form.location.as_deref().unwrap_or(""));

    let clean = ContactForm {
        name: sanitize_string(&form.name),
        email: sanitize_email(&form.email),
        phone: sanitize_phone(&form.phone),
        event_type: sanitize_string(&form.event_type),
        event_date: form.event_date.as_deref().map(sanitize_string),
        location: form.location.as_deref().map(sanitize_string),
        message: form.message.as_deref().map(sanitize_string),
    };
    (clean, suspicious)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn form() -> ContactForm {
        ContactForm {
            name: "John Doe".into(),
            email: "john@example.com".into(),
            phone: "(901) 555-1234".into(),
            event_type: "Wedding".into(),
            event_date: None,
            location: Some("Memphis, TN".into()),
            message: Some("Looking forward to it!".into()),
        }
    }

    fn request(pipeline: &SubmissionPipeline, ip: &str) -> SubmissionRequest {
        SubmissionRequest {
            caller_key: ip.into(),
            idempotency_key: pipeline.generate_key(),
            form: form(),
        }
    }

    #[test]
    fn valid_submission_is_accepted() {
        let pipeline = SubmissionPipeline::new(PipelineConfig::default());

        let outcome = pipeline
            .submit::<_, ()>(request(&pipeline, "1.1.1.1"), |form| {
                Ok(json!({ "lead": form.email }))
            })
            .unwrap();

        match outcome {
            SubmissionOutcome::Accepted {
                result,
                warnings,
                suspicious_fields,
            } => {
                assert_eq!(result, json!({ "lead": "john@example.com" }));
                assert!(warnings.is_empty());
                assert!(suspicious_fields.is_empty());
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[test]
    fn action_receives_sanitized_fields() {
        let pipeline = SubmissionPipeline::new(PipelineConfig::default());
        let mut request = request(&pipeline, "1.1.1.2");
        request.form.name = "<script>alert(1)</script>John Doe".into();
        request.form.email = "  JOHN@EXAMPLE.COM ".into();

        pipeline
            .submit::<_, ()>(request, |form| {
                assert_eq!(form.name, "John Doe");
                assert_eq!(form.email, "john@example.com");
                Ok(json!(null))
            })
            .unwrap();
    }

    #[test]
    fn invalid_form_is_rejected_and_runs_no_action() {
        let pipeline = SubmissionPipeline::new(PipelineConfig::default());
        let mut request = request(&pipeline, "1.1.1.3");
        request.form.phone = "123".into();

        let outcome = pipeline
            .submit::<_, ()>(request, |_| panic!("action must not run"))
            .unwrap();

        match outcome {
            SubmissionOutcome::Invalid { errors, .. } => {
                assert!(errors.contains_key("phone"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn rate_limit_gate_fires_first() {
        let config = PipelineConfig {
            max_requests: 2,
            ..PipelineConfig::default()
        };
        let pipeline = SubmissionPipeline::new(config);

        for _ in 0..2 {
            let outcome = pipeline
                .submit::<_, ()>(request(&pipeline, "9.9.9.9"), |_| Ok(json!(null)))
                .unwrap();
            assert!(matches!(outcome, SubmissionOutcome::Accepted { .. }));
        }

        // Even an invalid form is answered with the rate-limit rejection.
        let mut blocked = request(&pipeline, "9.9.9.9");
        blocked.form.email = "broken".into();
        let outcome = pipeline
            .submit::<_, ()>(blocked, |_| panic!("action must not run"))
            .unwrap();
        match outcome {
            SubmissionOutcome::RateLimited { retry_after } => {
                assert!(retry_after > Duration::ZERO);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_key_replays_without_rerunning() {
        let pipeline = SubmissionPipeline::new(PipelineConfig::default());
        let key = pipeline.generate_key();
        let mut executions = 0;

        for attempt in 0..3 {
            let request = SubmissionRequest {
                caller_key: format!("2.2.2.{attempt}"),
                idempotency_key: key.clone(),
                form: form(),
            };
            let outcome = pipeline
                .submit::<_, ()>(request, |_| {
                    executions += 1;
                    Ok(json!({ "id": 77 }))
                })
                .unwrap();

            match (attempt, outcome) {
                (0, SubmissionOutcome::Accepted { result, .. }) => {
                    assert_eq!(result, json!({ "id": 77 }));
                }
                (_, SubmissionOutcome::Duplicate { result }) => {
                    assert_eq!(result, json!({ "id": 77 }));
                }
                (n, other) => panic!("attempt {n}: unexpected {other:?}"),
            }
        }
        assert_eq!(executions, 1);
    }

    #[test]
    fn action_error_propagates_and_permits_retry() {
        let pipeline = SubmissionPipeline::new(PipelineConfig::default());
        let key = pipeline.generate_key();
        let make_request = |ip: &str| SubmissionRequest {
            caller_key: ip.into(),
            idempotency_key: key.clone(),
            form: form(),
        };

        let failed: Result<SubmissionOutcome, &str> =
            pipeline.submit(make_request("3.3.3.1"), |_| Err("insert failed"));
        assert_eq!(failed.unwrap_err(), "insert failed");

        let retried = pipeline
            .submit::<_, &str>(make_request("3.3.3.2"), |_| Ok(json!("stored")))
            .unwrap();
        assert!(matches!(retried, SubmissionOutcome::Accepted { .. }));
    }

    #[test]
    fn suspicious_content_is_flagged_but_accepted() {
        let pipeline = SubmissionPipeline::new(PipelineConfig::default());
        let mut request = request(&pipeline, "4.4.4.4");
        request.form.message = Some("'; DROP TABLE leads;-- please call me".into());

        let outcome = pipeline
            .submit::<_, ()>(request, |_| Ok(json!(null)))
            .unwrap();

        match outcome {
            SubmissionOutcome::Accepted {
                suspicious_fields, ..
            } => {
                assert_eq!(suspicious_fields, vec!["message".to_string()]);
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[test]
    fn warnings_surface_on_accepted_outcome() {
        let pipeline = SubmissionPipeline::new(PipelineConfig::default());
        let mut request = request(&pipeline, "5.5.5.5");
        request.form.email = "john@gmial.com".into();

        let outcome = pipeline
            .submit::<_, ()>(request, |_| Ok(json!(null)))
            .unwrap();

        match outcome {
            SubmissionOutcome::Accepted { warnings, .. } => {
                assert!(warnings.get("email").unwrap().contains("gmail.com"));
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[test]
    fn window_expiry_unblocks_caller() {
        let clock = ManualClock::new();
        let config = PipelineConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
            ..PipelineConfig::default()
        };
        let pipeline =
            SubmissionPipeline::with_parts(config, MemoryReplayStore::new(), clock.clone());

        let submit = |pipeline: &SubmissionPipeline<MemoryReplayStore, ManualClock>| {
            let request = SubmissionRequest {
                caller_key: "6.6.6.6".into(),
                idempotency_key: pipeline.generate_key(),
                form: form(),
            };
            pipeline
                .submit::<_, ()>(request, |_| Ok(json!(null)))
                .unwrap()
        };

        assert!(matches!(submit(&pipeline), SubmissionOutcome::Accepted { .. }));
        assert!(matches!(
            submit(&pipeline),
            SubmissionOutcome::RateLimited { .. }
        ));

        clock.advance(Duration::from_secs(61));
        assert!(matches!(submit(&pipeline), SubmissionOutcome::Accepted { .. }));
    }
}
