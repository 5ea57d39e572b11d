//! Error types for the focus engine.
//!
//! Only integration misuse surfaces as an [`Error`]: duplicate
//! registrations, unbalanced scope pops, updates against unknown ids.
//! Runtime conditions arising from user input or timing (a failed
//! validator, a missing restore target, no eligible next element) are
//! reported as `false` returns plus a log line, never as errors.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Integration errors raised synchronously at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An element with this id is already registered. Re-registering an id
    /// before unregistering it is an integration bug in the caller.
    #[error("element `{id}` is already registered")]
    DuplicateElement {
        /// The offending element id.
        id: String,
    },

    /// The element id is not present in the registry.
    #[error("element `{id}` is not registered")]
    UnknownElement {
        /// The missing element id.
        id: String,
    },

    /// A scope with this id is already on the stack; every non-default
    /// scope has at most one entry at a time.
    #[error("scope `{id}` is already open")]
    ScopeAlreadyOpen {
        /// The offending scope id.
        id: String,
    },

    /// `pop_scope` was called while only the default scope remained.
    #[error("the default scope cannot be popped")]
    CannotPopDefault,
}

/// A validator predicate failed instead of answering.
///
/// Carried inside validator results; the pipeline converts it into a
/// rejection (`false`) and logs it, so it never reaches engine callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
