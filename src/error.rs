//! Error types for the pipeline's storage seams.
//!
//! Expected gate outcomes (rate-limited, invalid form, duplicate replay) are
//! structured return values, not errors; see
//! [`SubmissionOutcome`](crate::SubmissionOutcome). The only genuine error in
//! this crate is a storage backend that cannot be reached, and the draft
//! manager deliberately swallows that (fail-soft) after logging it.

use std::fmt;

/// Error returned by a [`DraftStore`](crate::DraftStore) backend.
///
/// # Examples
///
/// ```
/// use formguard::{StorageError, StorageErrorKind};
///
/// let error = StorageError::new(StorageErrorKind::Unavailable, "quota exceeded");
/// assert_eq!(error.kind(), StorageErrorKind::Unavailable);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    kind: StorageErrorKind,
    message: String,
}

impl StorageError {
    /// Creates a new storage error.
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage failed ({}): {}", self.kind, self.message)
    }
}

impl std::error::Error for StorageError {}

/// Kind of storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The backend cannot be reached or refuses writes (quota, privacy mode).
    Unavailable,
    /// A stored payload could not be decoded.
    Corrupted,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::Corrupted => write!(f, "corrupted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_carries_kind_and_message() {
        let error = StorageError::new(StorageErrorKind::Corrupted, "bad json");

        assert_eq!(error.kind(), StorageErrorKind::Corrupted);
        assert_eq!(error.message(), "bad json");
    }

    #[test]
    fn storage_error_display() {
        let error = StorageError::new(StorageErrorKind::Unavailable, "private browsing");

        let output = format!("{}", error);
        assert!(output.contains("storage failed"));
        assert!(output.contains("unavailable"));
        assert!(output.contains("private browsing"));
    }
}
