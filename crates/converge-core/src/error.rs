//! Error types surfaced by the convergence engine.
//!
//! Every terminal failure of a [`retry`](crate::retry()) or
//! [`wait_for`](crate::wait_for()) session is one variant of [`Error`]. The
//! enum is generic over the caller's own error type `E` so the underlying
//! API error is never stringified away: callers match on the variant and
//! still get the original value back.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for convergence sessions.
pub type Result<T, E> = std::result::Result<T, Error<E>>;

/// Terminal outcome of a failed retry or wait session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error<E> {
    /// The session ran out of time.
    ///
    /// For a retry session this is returned when the grace attempt made
    /// after the deadline also failed. For a wait session it is returned
    /// when the resource was still converging at the deadline.
    #[error("timeout while waiting for state to become {expected:?} (last state: {last_state:?}, timeout: {timeout:?})")]
    Timeout {
        /// Last state reported by the probe, if any probe succeeded.
        last_state: Option<String>,
        /// Error from the final attempt or probe, if it failed.
        #[source]
        last_error: Option<E>,
        /// The session budget that was exhausted.
        timeout: Duration,
        /// States that would have ended the session successfully.
        expected: Vec<String>,
    },

    /// The probe reported a state that is neither pending nor a target.
    #[error("unexpected state '{observed}', wanted target {expected:?}")]
    UnexpectedState {
        /// The state the remote system reported.
        observed: String,
        /// States that would have ended the session successfully.
        expected: Vec<String>,
    },

    /// The classifier declared the error non-retryable.
    #[error("non-retryable error: {cause}")]
    NonRetryable {
        /// The error exactly as the operation returned it.
        #[source]
        cause: E,
    },

    /// The resource stayed absent for too many consecutive probes.
    #[error("couldn't find resource ({checks} retries)")]
    NotFound {
        /// Number of consecutive absent observations.
        checks: u32,
    },

    /// The session was cancelled through its cancellation token.
    #[error("convergence cancelled")]
    Cancelled,
}

impl<E> Error<E> {
    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Whether this error is an unexpected-state failure.
    pub fn is_unexpected_state(&self) -> bool {
        matches!(self, Error::UnexpectedState { .. })
    }

    /// Whether this error wraps a non-retryable cause.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, Error::NonRetryable { .. })
    }

    /// Whether the resource was never found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether the session was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The underlying caller error, if this variant carries one.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Error::Timeout { last_error, .. } => last_error.as_ref(),
            Error::NonRetryable { cause } => Some(cause),
            _ => None,
        }
    }

    /// Consume the error and return the underlying caller error, if any.
    ///
    /// Useful for adapters that want to report the raw API error and only
    /// care about the engine's classification for control flow.
    pub fn into_cause(self) -> Option<E> {
        match self {
            Error::Timeout { last_error, .. } => last_error,
            Error::NonRetryable { cause } => Some(cause),
            _ => None,
        }
    }

    /// Map the caller error type, preserving the variant.
    pub fn map_cause<F, O>(self, f: F) -> Error<O>
    where
        F: FnOnce(E) -> O,
    {
        match self {
            Error::Timeout {
                last_state,
                last_error,
                timeout,
                expected,
            } => Error::Timeout {
                last_state,
                last_error: last_error.map(f),
                timeout,
                expected,
            },
            Error::UnexpectedState { observed, expected } => {
                Error::UnexpectedState { observed, expected }
            }
            Error::NonRetryable { cause } => Error::NonRetryable { cause: f(cause) },
            Error::NotFound { checks } => Error::NotFound { checks },
            Error::Cancelled => Error::Cancelled,
        }
    }
}

/// Invalid session configuration, reported by the `WaitSpec` and `RetrySpec` builders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// No timeout was supplied.
    #[error("a timeout is required")]
    MissingTimeout,

    /// A state appears in both the pending and target sets.
    #[error("state '{0}' is both pending and target")]
    OverlappingStates(String),

    /// `target_occurrences` must be at least one.
    #[error("target occurrences must be at least 1")]
    ZeroTargetOccurrences,

    /// A duration string in a timeouts block could not be parsed.
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}
