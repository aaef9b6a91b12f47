//! Input sanitization for untrusted form fields.
//!
//! Sanitization produces a safe, normalized copy of each textual field before
//! it reaches validation or storage. It never fails: empty or hostile input
//! degrades to an empty string, and suspicious-pattern detection is advisory
//! data for the caller, never a rejection.
//!
//! These functions deliberately do **not** escape content for any output
//! context (no HTML-entity encoding); that belongs to the renderer.

use once_cell::sync::Lazy;
use regex::Regex;

// Script-executing markup. Applied to a fixpoint so nested fragments such as
// `<scr<script>ipt>` cannot reassemble into an executable tag.
static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));
static SCRIPT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?script\b[^>]*>").expect("valid regex"));
static EVENT_HANDLER_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<[a-z][^>]*\bon[a-z]+\s*=[^>]*>"#).expect("valid regex"));
static JAVASCRIPT_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript\s*:").expect("valid regex"));

// Injection probes worth flagging. Detection is advisory: the sanitizer
// reports, the caller decides the consequence.
static SUSPICIOUS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // SQL control sequences: quote-terminated statements, comment markers,
        // and the classic verbs.
        r#"(?i)['"]\s*;"#,
        r"(?i);\s*--",
        r"--\s*$",
        r"(?i)\b(union\s+select|drop\s+table|insert\s+into|delete\s+from|exec\s*\()",
        // Script payloads that survive as text after markup stripping.
        r"(?i)<\s*script",
        r"(?i)javascript\s*:",
        // Template-injection and path-traversal probes.
        r"\$\{[^}]*\}",
        r"\.\./\.\./",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

// Anything after an extension label is not part of the dialable number.
static PHONE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:ext\.?|extension|x)\s*\d|#").expect("valid regex"));

/// Strips script-executing markup from a free-text field and trims it.
///
/// Removes `<script>` blocks, stray script tags, tags carrying event-handler
/// attributes, and `javascript:` URIs. Benign punctuation and interior
/// whitespace are preserved. The result is a fixpoint: sanitizing twice
/// yields the same string as sanitizing once.
///
/// # Examples
///
/// ```
/// use formguard::sanitize_string;
///
/// let clean = sanitize_string("<script>alert(1)</script>Hello");
/// assert_eq!(clean, "Hello");
/// assert_eq!(sanitize_string(&clean), clean);
/// ```
pub fn sanitize_string(raw: &str) -> String {
    let mut current = raw.to_string();
    // Stripping can splice surviving text into a new dangerous token, so
    // re-apply until nothing changes.
    loop {
        let mut next = SCRIPT_BLOCK.replace_all(&current, "").into_owned();
        next = SCRIPT_TAG.replace_all(&next, "").into_owned();
        next = EVENT_HANDLER_TAG.replace_all(&next, "").into_owned();
        next = JAVASCRIPT_URI.replace_all(&next, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current.trim().to_string()
}

/// Normalizes an email address: trims surrounding whitespace and lower-cases.
///
/// Structural validation is the validator's job, not this function's.
///
/// # Examples
///
/// ```
/// use formguard::sanitize_email;
///
/// assert_eq!(sanitize_email("  TEST@EXAMPLE.COM  "), "test@example.com");
/// ```
pub fn sanitize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Reduces a phone field to the dialable number.
///
/// Truncates at an extension label (`ext`, `extension`, `x<digit>`, `#`),
/// then retains only digits and the conventional formatting characters
/// `(`, `)`, `-`, and space.
///
/// # Examples
///
/// ```
/// use formguard::sanitize_phone;
///
/// assert_eq!(sanitize_phone("(901) 555-1234 ext. 123"), "(901) 555-1234");
/// ```
pub fn sanitize_phone(raw: &str) -> String {
    let number = match PHONE_EXTENSION.find(raw) {
        Some(label) => &raw[..label.start()],
        None => raw,
    };
    number
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '(' | ')' | '-' | ' '))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Reports whether a field looks like an injection probe.
///
/// Purely advisory: a `true` here should be logged and attached to the
/// submission outcome, not used as a hard rejection.
///
/// # Examples
///
/// ```
/// use formguard::has_suspicious_patterns;
///
/// assert!(has_suspicious_patterns("'; DROP TABLE users;--"));
/// assert!(!has_suspicious_patterns("Looking forward to the event!"));
/// ```
pub fn has_suspicious_patterns(raw: &str) -> bool {
    let hit = SUSPICIOUS.iter().any(|pattern| pattern.is_match(raw));
    if hit {
        tracing::warn!(length = raw.len(), "suspicious pattern detected in field");
    }
    hit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_script_blocks() {
        let clean = sanitize_string("<script>alert(\"xss\")</script>Hello");
        assert_eq!(clean, "Hello");
        assert!(!clean.contains("<script"));
    }

    #[test]
    fn removes_nested_script_fragments() {
        let clean = sanitize_string("<scr<script>ipt>alert(1)</scr</script>ipt>safe");
        assert!(!clean.to_lowercase().contains("<script"));
        assert!(clean.contains("safe"));
    }

    #[test]
    fn removes_event_handler_tags() {
        let clean = sanitize_string(r#"<img src=x onerror=alert(1)>photo"#);
        assert_eq!(clean, "photo");
    }

    #[test]
    fn removes_javascript_uris() {
        let clean = sanitize_string("click javascript:alert(1) here");
        assert_eq!(clean, "click alert(1) here");
    }

    #[test]
    fn preserves_benign_punctuation() {
        let input = "We'd love a DJ for ~4 hours - details: 50% outdoors, 50% indoors!";
        assert_eq!(sanitize_string(input), input);
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(sanitize_string("  hello  "), "hello");
    }

    #[test]
    fn empty_input_yields_empty_string() {
        assert_eq!(sanitize_string(""), "");
        assert_eq!(sanitize_email(""), "");
        assert_eq!(sanitize_phone(""), "");
    }

    #[test]
    fn does_not_entity_encode() {
        assert_eq!(sanitize_string("Tom & Jerry <3"), "Tom & Jerry <3");
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(sanitize_email("  TEST@EXAMPLE.COM  "), "test@example.com");
    }

    #[test]
    fn phone_keeps_conventional_formatting() {
        assert_eq!(sanitize_phone("(901) 555-1234"), "(901) 555-1234");
    }

    #[test]
    fn phone_strips_extension_and_labels() {
        assert_eq!(sanitize_phone("(901) 555-1234 ext. 123"), "(901) 555-1234");
        assert_eq!(sanitize_phone("901-555-1234 x55"), "901-555-1234");
        assert_eq!(sanitize_phone("901.555.1234 #9"), "9015551234");
    }

    #[test]
    fn phone_drops_foreign_characters() {
        assert_eq!(sanitize_phone("+1 (901) 555-1234"), "1 (901) 555-1234");
        assert_eq!(sanitize_phone("call me: 555-0000"), "555-0000");
    }

    #[test]
    fn detects_sql_injection() {
        assert!(has_suspicious_patterns("'; DROP TABLE users;--"));
        assert!(has_suspicious_patterns("1 UNION SELECT password FROM users"));
    }

    #[test]
    fn detects_template_and_traversal_probes() {
        assert!(has_suspicious_patterns("${7*7}"));
        assert!(has_suspicious_patterns("../../etc/passwd"));
    }

    #[test]
    fn ordinary_prose_is_not_suspicious() {
        assert!(!has_suspicious_patterns("We're getting married on 2026-10-03!"));
        assert!(!has_suspicious_patterns("Budget: $1,500 - $2,000"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: sanitize_string is idempotent for all inputs.
            #[test]
            fn proptest_sanitize_string_idempotent(input in ".{0,200}") {
                let once = sanitize_string(&input);
                let twice = sanitize_string(&once);
                prop_assert_eq!(once, twice);
            }

            /// Property: no `<script` substring ever survives sanitization.
            #[test]
            fn proptest_no_script_survives(input in ".{0,200}") {
                let clean = sanitize_string(&input).to_lowercase();
                prop_assert!(!SCRIPT_TAG.is_match(&clean));
            }

            /// Property: sanitize_phone output contains only the allowed alphabet.
            #[test]
            fn proptest_phone_alphabet(input in ".{0,100}") {
                let clean = sanitize_phone(&input);
                let all_allowed = clean.chars().all(|c| {
                    c.is_ascii_digit() || matches!(c, '(' | ')' | '-' | ' ')
                });
                prop_assert!(all_allowed);
            }

            /// Property: sanitize_email never panics and stays within the
            /// worst-case lowercase expansion.
            #[test]
            fn proptest_email_never_panics(input in ".{0,100}") {
                let clean = sanitize_email(&input);
                prop_assert!(clean.len() <= 4 * input.len());
            }
        }
    }
}
