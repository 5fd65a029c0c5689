//! Error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Kind of failure, independent of where it was raised.
///
/// Callers branch on the kind; the `code`/`key` pair on [`DomainError`] is the
/// stable, machine-readable detail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed, missing or contradictory input.
    InvalidArgument,
    /// Required entity does not exist.
    NotFound,
    /// Entity exists where absence was required.
    AlreadyExists,
    /// State does not satisfy a required invariant.
    PreconditionFailed,
    /// Authorization refused.
    PermissionDenied,
    /// Concurrent modification detected at write time.
    Conflict,
    /// Storage or collaborator unavailable (including deadline expiry).
    Unavailable,
    /// Unexpected structural failure (e.g. undecodable event payload).
    Internal,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::PreconditionFailed => "precondition failed",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Domain-level error.
///
/// Every variant carries a stable `code` (e.g. `"GROUP-0003"`) and a message
/// `key` (e.g. `"errors.group.not_found"`). Neither contains request data, so
/// the error can cross the API boundary as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid argument [{code}]: {key}")]
    InvalidArgument { code: &'static str, key: &'static str },

    #[error("not found [{code}]: {key}")]
    NotFound { code: &'static str, key: &'static str },

    #[error("already exists [{code}]: {key}")]
    AlreadyExists { code: &'static str, key: &'static str },

    #[error("precondition failed [{code}]: {key}")]
    PreconditionFailed { code: &'static str, key: &'static str },

    #[error("permission denied [{code}]: {key}")]
    PermissionDenied { code: &'static str, key: &'static str },

    #[error("conflict [{code}]: {key}")]
    Conflict { code: &'static str, key: &'static str },
}

impl DomainError {
    pub fn invalid_argument(code: &'static str, key: &'static str) -> Self {
        Self::InvalidArgument { code, key }
    }

    pub fn not_found(code: &'static str, key: &'static str) -> Self {
        Self::NotFound { code, key }
    }

    pub fn already_exists(code: &'static str, key: &'static str) -> Self {
        Self::AlreadyExists { code, key }
    }

    pub fn precondition_failed(code: &'static str, key: &'static str) -> Self {
        Self::PreconditionFailed { code, key }
    }

    pub fn permission_denied(code: &'static str, key: &'static str) -> Self {
        Self::PermissionDenied { code, key }
    }

    pub fn conflict(code: &'static str, key: &'static str) -> Self {
        Self::Conflict { code, key }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            DomainError::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            DomainError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            DomainError::Conflict { .. } => ErrorKind::Conflict,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InvalidArgument { code, .. }
            | DomainError::NotFound { code, .. }
            | DomainError::AlreadyExists { code, .. }
            | DomainError::PreconditionFailed { code, .. }
            | DomainError::PermissionDenied { code, .. }
            | DomainError::Conflict { code, .. } => code,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            DomainError::InvalidArgument { key, .. }
            | DomainError::NotFound { key, .. }
            | DomainError::AlreadyExists { key, .. }
            | DomainError::PreconditionFailed { key, .. }
            | DomainError::PermissionDenied { key, .. }
            | DomainError::Conflict { key, .. } => key,
        }
    }
}
