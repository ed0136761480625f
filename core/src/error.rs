//! Error taxonomy shared by every layer of the service.
//!
//! Each variant maps to one stable machine-readable code; the web layer turns them
//! into HTTP responses.

use thiserror::Error;

/// Result type alias for appeals operations.
pub type Result<T> = std::result::Result<T, AppealsError>;

/// Errors raised by the domain, the stores and the adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppealsError {
    /// Malformed or semantically invalid input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Ticket, message, department or user does not exist.
    #[error("{resource} with id {id} not found")]
    NotFound {
        /// Kind of resource that was looked up
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Authenticated, but not allowed to perform this action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Conflicting concurrent state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Persistence backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unexpected failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppealsError {
    /// Shorthand for [`AppealsError::NotFound`].
    pub fn not_found(resource: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) | Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether this error is the caller's fault (4xx) rather than ours.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Internal(_))
    }
}
