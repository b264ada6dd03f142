//! Domain error model.
//!
//! Every failure that crosses the service boundary is reduced to one of a
//! closed set of [`ErrorKind`]s. Layers pattern-match on the kind instead of
//! comparing message strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Error-kind identifiers surfaced across the transport boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Caller lacks the USER role, or lacks ownership/ADMIN on the target.
    MissingPermission,
    /// Email failed the syntax check.
    InvalidEmail,
    /// Email is already taken.
    UnavailableEmail,
    /// Username missing (when required) or failed the syntax check.
    InvalidUsername,
    /// Username is already taken.
    UnavailableUsername,
    /// Target user does not exist.
    NotFound,
    /// Any other storage failure, propagated unmodified.
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MissingPermission => "MISSING_PERMISSION",
            ErrorKind::InvalidEmail => "INVALID_EMAIL",
            ErrorKind::UnavailableEmail => "UNAVAILABLE_EMAIL",
            ErrorKind::InvalidUsername => "INVALID_USERNAME",
            ErrorKind::UnavailableUsername => "UNAVAILABLE_USERNAME",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Storage => "STORAGE",
        }
    }

    /// The core never retries. Retry policy, if any, belongs to the client.
    pub fn is_retryable(self) -> bool {
        false
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("missing permission")]
    MissingPermission,

    #[error("invalid email")]
    InvalidEmail,

    #[error("email is not available")]
    UnavailableEmail,

    #[error("invalid username")]
    InvalidUsername,

    #[error("username is not available")]
    UnavailableUsername,

    /// An identifier was invalid (e.g. parse failure, non-positive id).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("user does not exist")]
    NotFound,

    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::MissingPermission => ErrorKind::MissingPermission,
            DomainError::InvalidEmail => ErrorKind::InvalidEmail,
            DomainError::UnavailableEmail => ErrorKind::UnavailableEmail,
            DomainError::InvalidUsername => ErrorKind::InvalidUsername,
            DomainError::UnavailableUsername => ErrorKind::UnavailableUsername,
            // An id that can never exist is reported the same as a missing row.
            DomainError::InvalidId(_) | DomainError::NotFound => ErrorKind::NotFound,
            DomainError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<ErrorKind> for DomainError {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::MissingPermission => DomainError::MissingPermission,
            ErrorKind::InvalidEmail => DomainError::InvalidEmail,
            ErrorKind::UnavailableEmail => DomainError::UnavailableEmail,
            ErrorKind::InvalidUsername => DomainError::InvalidUsername,
            ErrorKind::UnavailableUsername => DomainError::UnavailableUsername,
            ErrorKind::NotFound => DomainError::NotFound,
            ErrorKind::Storage => DomainError::Storage(String::new()),
        }
    }
}
