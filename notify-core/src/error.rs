//! Error Types
//!
//! Every failure the notification engine can report is a variant of
//! [`NotifyError`]. Structural misuse (bad handlers, illegal state
//! transitions, unbalanced protection) is reported at the call that violates
//! the contract. Panics raised by user handlers are not wrapped: they unwind
//! through `emit` to whoever triggered the emission.

use thiserror::Error;

use crate::gc::ObjectId;

/// Errors reported by signals, value objects and protectors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The handler cannot be invoked the way the signal would invoke it.
    #[error("invalid handler: {0}")]
    InvalidHandler(String),

    /// An illegal protocol transition, such as unblocking an unblocked signal.
    #[error("illegal state transition: {0}")]
    State(String),

    /// A strict protector saw more `unprotect` calls than `protect` calls.
    #[error("object {0} was unprotected more times than it was protected")]
    Unprotection(ObjectId),

    /// A restricted variable rejected a value outside its domain.
    #[error("value is outside the `{domain}` domain")]
    TypeConstraint { domain: String },

    /// A user-supplied equality check failed during change detection.
    #[error("value comparison failed: {0}")]
    Comparison(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NotifyError {
    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub(crate) fn invalid_handler(message: impl Into<String>) -> Self {
        Self::InvalidHandler(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = NotifyError::state("cannot unblock");
        assert_eq!(err.to_string(), "illegal state transition: cannot unblock");

        let err = NotifyError::TypeConstraint { domain: "percent".into() };
        assert_eq!(err.to_string(), "value is outside the `percent` domain");
    }
}
