//! Error taxonomy for disposition and claim operations.
//!
//! Every failure surfaced by the services maps to one of four stable kinds.
//! Storage-layer failures are folded into [`DispositionError::Internal`] at the
//! store boundary so callers never see driver detail.

use thiserror::Error;

/// Result type alias for disposition operations.
pub type Result<T> = std::result::Result<T, DispositionError>;

/// Errors returned by the disposition services and entity stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispositionError {
    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity name (`stray`, `owner`, `adoption request`, ...)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A state-machine guard was violated (e.g. claiming a request that is
    /// not approved, redeeming an animal that is up for adoption).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A required field is missing or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Transaction or storage failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispositionError {
    /// Build a [`DispositionError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Build a [`DispositionError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Build a [`DispositionError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Build a [`DispositionError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a caller may retry the operation.
    ///
    /// Only conflicts are retryable: the competing transaction may have rolled
    /// back. `NotFound` and `InvalidArgument` will fail the same way again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(DispositionError::not_found("stray", 7).code(), "NOT_FOUND");
        assert_eq!(DispositionError::conflict("x").code(), "CONFLICT");
        assert_eq!(DispositionError::invalid("x").code(), "INVALID_ARGUMENT");
        assert_eq!(DispositionError::internal("x").code(), "INTERNAL");
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(DispositionError::conflict("busy").is_retryable());
        assert!(!DispositionError::not_found("pet", 1).is_retryable());
        assert!(!DispositionError::invalid("tag").is_retryable());
        assert!(!DispositionError::internal("db").is_retryable());
    }

    #[test]
    fn not_found_display() {
        let err = DispositionError::not_found("adoption request", 9);
        assert_eq!(err.to_string(), "adoption request 9 not found");
    }
}
