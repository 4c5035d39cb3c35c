//! Error types for isolock.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages.

use thiserror::Error;

/// Errors raised while acquiring the engine entry token.
#[derive(Debug, Error)]
pub enum LockError {
    /// The token was not released within the requested window.
    ///
    /// Only produced by [`crate::engine::EngineLock::enter_timeout`]; the
    /// blocking [`crate::engine::EngineLock::enter`] never fails, it only
    /// waits.
    #[error("engine lock not acquired within {duration_ms}ms")]
    Timeout {
        /// How long the caller was willing to wait.
        duration_ms: u64,
    },

    /// The token channel is closed.
    ///
    /// This cannot happen while the owning `EngineLock` is alive; it is
    /// surfaced rather than panicking so callers keep an explicit error path.
    #[error("engine lock token channel closed")]
    Closed,
}

/// Errors raised by mutation entry points.
#[derive(Debug, Error)]
pub enum MutateError {
    /// Mutation was attempted before any record was registered.
    #[error("no shared record registered; call setup() or start() first")]
    Unregistered,

    /// Lock acquisition failed while serializing the mutation.
    #[error("lock acquisition failed: {0}")]
    Lock(#[from] LockError),
}

/// Top-level error type for isolock.
#[derive(Debug, Error)]
pub enum IsolockError {
    /// Lock acquisition error.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Mutation error.
    #[error("mutation error: {0}")]
    Mutate(#[from] MutateError),

    /// Internal invariant violation.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable description of the broken invariant.
        message: String,
    },
}

impl IsolockError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a lock error.
    #[must_use]
    pub const fn is_lock(&self) -> bool {
        matches!(self, Self::Lock(_))
    }

    /// Returns true if this is a mutation error.
    #[must_use]
    pub const fn is_mutate(&self) -> bool {
        matches!(self, Self::Mutate(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Timeouts are retryable; a missing registration or a broken invariant
    /// will not change on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Lock(e) | Self::Mutate(MutateError::Lock(e)) => {
                matches!(e, LockError::Timeout { .. })
            }
            Self::Mutate(MutateError::Unregistered) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for isolock operations.
pub type IsolockResult<T> = Result<T, IsolockError>;
