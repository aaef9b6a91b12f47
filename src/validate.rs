//! Field and whole-form validation.
//!
//! Validation runs on sanitized values and separates hard failures (which
//! block submission) from soft warnings (which are surfaced to the user as a
//! confirmation prompt and never block). A single error anywhere makes the
//! whole form invalid.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// Pragmatic structural check: local part, one `@`, dotted domain. Full RFC
// parsing buys nothing on a public lead form.
static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

// One-edit-distance misspellings of major providers, mapped to the likely
// intended domain.
static TYPO_DOMAINS: &[(&str, &str)] = &[
    ("gmial.com", "gmail.com"),
    ("gmai.com", "gmail.com"),
    ("gmil.com", "gmail.com"),
    ("yahooo.com", "yahoo.com"),
    ("yaho.com", "yahoo.com"),
    ("hotmial.com", "hotmail.com"),
    ("outlok.com", "outlook.com"),
];

static THROWAWAY_EMAIL: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^test.*@",
        r"(?i)^fake.*@",
        r"(?i)^spam.*@",
        r"(?i)^temp.*@",
        r"(?i)@temp",
        r"(?i)@test\.",
        r"^\d+@",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

/// Result of validating a single field.
///
/// `error` blocks submission; `warning` does not. A populated `error` always
/// means `valid == false`, and a warning never implies invalidity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldCheck {
    /// Whether the field passes hard validation.
    pub valid: bool,
    /// Hard failure message, present iff `valid` is false.
    pub error: Option<String>,
    /// Advisory message ("did you mean ...?"); never blocks.
    pub warning: Option<String>,
    /// A suggested correction, when one can be inferred (email typos).
    pub suggestion: Option<String>,
}

impl FieldCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            warning: Some(message.into()),
            ..Self::default()
        }
    }
}

/// The raw-to-sanitized shape of a contact/lead form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactForm {
    /// Submitter's name (required).
    pub name: String,
    /// Submitter's email (required).
    pub email: String,
    /// Submitter's phone (required).
    pub phone: String,
    /// Kind of event being inquired about (required).
    pub event_type: String,
    /// Event date in `YYYY-MM-DD` form (optional).
    pub event_date: Option<String>,
    /// Venue or city (optional).
    pub location: Option<String>,
    /// Free-text message (optional).
    pub message: Option<String>,
}

/// Whole-form validation result.
///
/// Created fresh per call and immutable once returned. A non-empty `errors`
/// map always implies `valid == false`; warnings never do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether the form may be submitted.
    pub valid: bool,
    /// Hard failures, keyed by field name.
    pub errors: BTreeMap<String, String>,
    /// Advisory messages, keyed by field name.
    pub warnings: BTreeMap<String, String>,
}

/// Rules for event-date validation.
#[derive(Debug, Clone, Copy)]
pub struct EventDateRules {
    /// Whether an empty date is a hard failure.
    pub required: bool,
    /// Minimum days between today and the event.
    pub min_days_ahead: i64,
    /// Maximum days between today and the event.
    pub max_days_ahead: i64,
    /// Permit dates before today (e.g., admin backfill).
    pub allow_past: bool,
}

impl Default for EventDateRules {
    fn default() -> Self {
        Self {
            required: false,
            min_days_ahead: 0,
            max_days_ahead: 730,
            allow_past: false,
        }
    }
}

/// Validates a name field.
///
/// Requires 2..=200 characters with at least one letter; rejects fields
/// drowning in special characters. A short single-word name passes with a
/// "full name?" warning.
pub fn validate_name(name: &str) -> FieldCheck {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return FieldCheck::fail("Name is required");
    }
    if trimmed.chars().count() < 2 {
        return FieldCheck::fail("Please enter your full name (at least 2 characters)");
    }
    if trimmed.chars().count() > 200 {
        return FieldCheck::fail("Name is too long (maximum 200 characters)");
    }
    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return FieldCheck::fail("Name must contain at least one letter");
    }

    let special = trimmed
        .chars()
        .filter(|c| !c.is_alphabetic() && !matches!(c, ' ' | '-' | '\'' | '.'))
        .count();
    if special > 3 {
        return FieldCheck::fail("Name contains too many special characters");
    }

    if !trimmed.contains(' ') && trimmed.chars().count() < 4 {
        return FieldCheck::warn("Did you mean to enter your full name?");
    }

    FieldCheck::ok()
}

/// Validates an email address.
///
/// Rejects structurally invalid addresses. A syntactically valid address on a
/// one-edit misspelling of a major provider domain passes with a non-fatal
/// warning and a suggested correction; throwaway-looking addresses pass with
/// a verification warning.
///
/// # Examples
///
/// ```
/// use formguard::validate_email;
///
/// assert!(validate_email("test@example.com").valid);
/// assert!(!validate_email("invalid").valid);
///
/// let typo = validate_email("someone@gmial.com");
/// assert!(typo.valid);
/// assert!(typo.warning.unwrap().contains("gmail.com"));
/// ```
pub fn validate_email(email: &str) -> FieldCheck {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return FieldCheck::fail("Email address is required");
    }
    // RFC 5321 upper bound.
    if trimmed.len() > 320 {
        return FieldCheck::fail("Email address is too long");
    }
    if !EMAIL_SHAPE.is_match(trimmed) {
        return FieldCheck::fail("Please enter a valid email address");
    }

    let lowered = trimmed.to_lowercase();
    let domain = lowered.rsplit('@').next().unwrap_or("");

    if let Some((_, intended)) = TYPO_DOMAINS.iter().find(|(typo, _)| *typo == domain) {
        let mut check = FieldCheck::warn(format!("Did you mean {intended}?"));
        check.suggestion = Some(lowered.replace(domain, intended));
        return check;
    }

    if THROWAWAY_EMAIL.iter().any(|pattern| pattern.is_match(&lowered)) {
        return FieldCheck::warn("This email address looks unusual. Please verify it's correct.");
    }

    FieldCheck::ok()
}

/// Validates a phone number.
///
/// Requires 10..=15 digits after stripping formatting; rejects well-known
/// placeholder and sequential patterns as almost-certainly fake, and US-style
/// numbers whose area code starts with 0 or 1.
///
/// # Examples
///
/// ```
/// use formguard::validate_phone;
///
/// assert!(validate_phone("(901) 555-1234").valid);
/// assert!(!validate_phone("123").valid);
/// assert!(!validate_phone("1234567890").valid);
/// ```
pub fn validate_phone(phone: &str) -> FieldCheck {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return FieldCheck::fail("Phone number is required");
    }

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return FieldCheck::fail("Please enter a valid phone number (at least 10 digits)");
    }
    // E.164 upper bound.
    if digits.len() > 15 {
        return FieldCheck::fail("Phone number is too long (maximum 15 digits)");
    }

    if is_placeholder_number(&digits) {
        return FieldCheck::fail("Please enter a valid phone number");
    }

    // NANP area codes cannot start with 0 or 1.
    if digits.len() == 10 || (digits.len() == 11 && digits.starts_with('1')) {
        let area_start = if digits.len() == 11 { 1 } else { 0 };
        let lead = digits.as_bytes()[area_start];
        if lead == b'0' || lead == b'1' {
            return FieldCheck::fail("Please enter a valid US phone number");
        }
    }

    FieldCheck::ok()
}

fn is_placeholder_number(digits: &str) -> bool {
    if digits == "1234567890" || digits == "5555555555" {
        return true;
    }
    // Same digit repeated through the whole number.
    let mut chars = digits.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => false,
    }
}

/// Formats a NANP number for display, passing anything else through untouched.
///
/// `9015551234` becomes `(901) 555-1234`; an 11-digit number with a leading
/// country code becomes `+1 (901) 555-1234`.
pub fn format_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..]),
        11 if digits.starts_with('1') => {
            format!("+1 ({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..])
        }
        _ => phone.trim().to_string(),
    }
}

/// Validates an event date against `rules`, relative to `today`.
///
/// The date must be in `YYYY-MM-DD` form. Dates inside the next seven days
/// pass with a short-notice warning.
pub fn validate_event_date(value: Option<&str>, rules: EventDateRules, today: NaiveDate) -> FieldCheck {
    let raw = match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => {
            if rules.required {
                return FieldCheck::fail("Event date is required");
            }
            return FieldCheck::ok();
        }
    };

    let date = match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => return FieldCheck::fail("Please enter a valid date (YYYY-MM-DD)"),
    };

    let days_ahead = (date - today).num_days();

    if !rules.allow_past && days_ahead < 0 {
        return FieldCheck::fail("Event date cannot be in the past");
    }
    if rules.min_days_ahead > 0 && days_ahead < rules.min_days_ahead {
        return FieldCheck::fail(format!(
            "Event date must be at least {} days from today",
            rules.min_days_ahead
        ));
    }
    if rules.max_days_ahead > 0 && days_ahead > rules.max_days_ahead {
        return FieldCheck::fail(format!(
            "Event date cannot be more than {} days from today",
            rules.max_days_ahead
        ));
    }

    if (0..7).contains(&days_ahead) {
        let plural = if days_ahead == 1 { "day" } else { "days" };
        return FieldCheck::warn(format!(
            "Your event is in {days_ahead} {plural}. We'll do our best to accommodate short-notice requests!"
        ));
    }

    FieldCheck::ok()
}

/// Validates an optional location/venue field (max 500 characters).
pub fn validate_location(location: Option<&str>) -> FieldCheck {
    match location.map(str::trim) {
        Some(v) if v.chars().count() > 500 => {
            FieldCheck::fail("Location is too long (maximum 500 characters)")
        }
        _ => FieldCheck::ok(),
    }
}

/// Validates an optional message field (max 5000 characters).
pub fn validate_message(message: Option<&str>) -> FieldCheck {
    match message.map(str::trim) {
        Some(v) if v.chars().count() > 5000 => {
            FieldCheck::fail("Message is too long (maximum 5000 characters)")
        }
        _ => FieldCheck::ok(),
    }
}

/// Validates a whole contact form.
///
/// Every required field must be present and individually valid; cross-field
/// rules (the event date must not be in the past) are evaluated here. A
/// single hard error anywhere makes the whole form invalid; warnings are
/// collected separately and never block.
///
/// # Examples
///
/// ```
/// use formguard::{validate_contact_form, ContactForm};
///
/// let form = ContactForm {
///     name: "John Doe".into(),
///     email: "john@example.com".into(),
///     phone: "(901) 555-1234".into(),
///     event_type: "Wedding".into(),
///     ..ContactForm::default()
/// };
///
/// let report = validate_contact_form(&form);
/// assert!(report.valid);
/// assert!(report.errors.is_empty());
/// ```
pub fn validate_contact_form(form: &ContactForm) -> ValidationReport {
    validate_contact_form_on(form, chrono::Utc::now().date_naive())
}

/// Like [`validate_contact_form`], with an explicit `today` for the date rules.
pub fn validate_contact_form_on(form: &ContactForm, today: NaiveDate) -> ValidationReport {
    let mut errors = BTreeMap::new();
    let mut warnings = BTreeMap::new();

    let mut record = |field: &str, check: FieldCheck| {
        if let Some(error) = check.error {
            errors.insert(field.to_string(), error);
        } else if let Some(warning) = check.warning {
            warnings.insert(field.to_string(), warning);
        }
    };

    record("name", validate_name(&form.name));
    record("email", validate_email(&form.email));
    record("phone", validate_phone(&form.phone));

    let event_type_check = if form.event_type.trim().is_empty() {
        FieldCheck::fail("Event type is required")
    } else {
        FieldCheck::ok()
    };
    record("event_type", event_type_check);

    record(
        "event_date",
        validate_event_date(form.event_date.as_deref(), EventDateRules::default(), today),
    );
    record("location", validate_location(form.location.as_deref()));
    record("message", validate_message(form.message.as_deref()));

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}
