//! Outward-facing error taxonomy.

use thiserror::Error;

/// Result type used across the credential core.
pub type AuthResult<T> = Result<T, AuthError>;

/// Coarse error kinds surfaced to callers of the credential core.
///
/// `Unauthorized` deliberately collapses every credential failure (unknown email,
/// wrong password, bad/expired/revoked token, session mismatch) into one value so
/// that callers cannot distinguish them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but lacking the permission named here.
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Store or codec failure unrelated to caller input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn forbidden(permission: impl Into<String>) -> Self {
        Self::Forbidden(permission.into())
    }

    /// Stable machine-readable code for transport mappings.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::Validation(_) => "validation_error",
            Self::Internal(_) => "internal_error",
        }
    }
}
