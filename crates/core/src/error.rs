//! Domain error model.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failures of the progress rules.
///
/// Outages and other store failures are not domain errors; the infra layer has
/// its own taxonomy and maps these into it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Rejected argument, e.g. a weekly goal of zero or an unknown rule table.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A rule table or streak that could never have been produced legitimately.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Stale streak version.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Conflicts resolve on retry; every other variant is final.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_offending_detail() {
        assert_eq!(
            DomainError::validation("weekly goal must be at least 1").to_string(),
            "validation failed: weekly goal must be at least 1"
        );
        assert!(DomainError::conflict("v2 != v3").is_conflict());
        assert!(!DomainError::invariant("duplicate rule").is_conflict());
    }
}
