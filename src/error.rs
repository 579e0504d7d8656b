//! Error taxonomy for the documentation pipeline.
//!
//! Only stage-fatal and caller-facing conditions are errors. Recoverable,
//! stage-local problems (an unreadable file, one failed generation batch)
//! are counted and surfaced in stage details instead; see
//! [`crate::parse::ParseWarning`] and [`crate::insight::InsightReport`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a repository could not be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchReason {
    /// The remote repository does not exist or is not visible.
    NotFound,
    /// The clone exceeded the configured size limit and was aborted.
    TooLarge,
    /// Transport failure or timeout.
    Network,
    /// Authentication was required or the local workspace was not writable.
    Permission,
}

impl FetchReason {
    /// Stable lowercase label used in stage details.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::TooLarge => "too_large",
            Self::Network => "network",
            Self::Permission => "permission",
        }
    }
}

/// Failure while materializing or probing a remote repository.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fetch failed ({}): {message}", reason.as_str())]
pub struct FetchError {
    /// Classified cause.
    pub reason: FetchReason,
    /// Human-readable explanation.
    pub message: String,
}

impl FetchError {
    /// Builds a fetch error with the given reason.
    pub fn new(reason: FetchReason, message: impl Into<String>) -> Self {
        Self { reason, message: message.into() }
    }

    /// Classifies git's stderr output into a fetch error.
    #[must_use]
    pub fn from_git_stderr(stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        let reason = if lower.contains("not found")
            || lower.contains("does not exist")
            || lower.contains("could not read username")
        {
            FetchReason::NotFound
        } else if lower.contains("permission denied") || lower.contains("authentication failed") {
            FetchReason::Permission
        } else {
            FetchReason::Network
        };
        let message = stderr.trim();
        let message = if message.is_empty() { "git exited with an error" } else { message };
        Self::new(reason, message)
    }
}

/// Failure reading or writing the record/document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying filesystem operation failed.
    #[error("store I/O failed for {key}: {message}")]
    Io {
        /// Record or document key.
        key: String,
        /// Underlying error text.
        message: String,
    },
    /// A persisted entry could not be (de)serialized.
    #[error("store entry {key} is corrupt: {message}")]
    Corrupt {
        /// Record or document key.
        key: String,
        /// Underlying error text.
        message: String,
    },
    /// A record update was requested for a name that has no record.
    #[error("no record named {0}")]
    MissingRecord(String),
    /// The in-memory index lock was poisoned by a panicking writer.
    #[error("record index lock poisoned")]
    Poisoned,
}

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The URL is malformed, on an unrecognized host, or the repository does not exist.
    #[error("invalid repository: {0}")]
    InvalidRepository(String),
    /// The repository could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// No such repository or documentation.
    #[error("not found: {0}")]
    NotFound(String),
    /// Another run for the same repository name is in flight.
    #[error("an analysis of {0} is already running")]
    AlreadyRunning(String),
    /// Record or document persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_missing_repository() {
        let err = FetchError::from_git_stderr("remote: Repository not found.\nfatal: ...");
        assert_eq!(err.reason, FetchReason::NotFound);
    }

    #[test]
    fn classifies_prompt_for_private_repository_as_not_found() {
        let err = FetchError::from_git_stderr(
            "fatal: could not read Username for 'https://github.com': terminal prompts disabled",
        );
        assert_eq!(err.reason, FetchReason::NotFound);
    }

    #[test]
    fn classifies_permission_errors() {
        let err = FetchError::from_git_stderr("git@github.com: Permission denied (publickey).");
        assert_eq!(err.reason, FetchReason::Permission);
    }

    #[test]
    fn falls_back_to_network() {
        let err = FetchError::from_git_stderr("fatal: unable to access: Could not resolve host");
        assert_eq!(err.reason, FetchReason::Network);
        let empty = FetchError::from_git_stderr("  ");
        assert_eq!(empty.message, "git exited with an error");
    }

    #[test]
    fn display_includes_reason_label() {
        let err = FetchError::new(FetchReason::TooLarge, "exceeded 1 MB");
        assert_eq!(err.to_string(), "fetch failed (too_large): exceeded 1 MB");
        let wrapped: PipelineError = err.into();
        assert_eq!(wrapped.to_string(), "fetch failed (too_large): exceeded 1 MB");
    }
}
