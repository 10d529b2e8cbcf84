//! Error classification for retry decisions.
//!
//! A classifier maps an operation error to [`Classification::Retryable`] or
//! [`Classification::NonRetryable`]. Every call site supplies its own,
//! because "retryable" only means something for a specific operation: a
//! role that is not yet assumable is worth retrying right after the role was
//! created, and meaningless anywhere else.
//!
//! Classifiers must default to [`Classification::NonRetryable`] for errors
//! they do not recognize. The combinators in this module follow that rule.
//!
//! # Examples
//!
//! ```rust
//! use converge_core::classify::{self, Classification};
//!
//! #[derive(Debug)]
//! enum ApiError {
//!     Throttled,
//!     AccessDenied,
//! }
//!
//! let throttling = |e: &ApiError| -> Classification { matches!(e, ApiError::Throttled).into() };
//! assert_eq!(throttling(&ApiError::Throttled), Classification::Retryable);
//! assert_eq!(throttling(&ApiError::AccessDenied), Classification::NonRetryable);
//!
//! let by_message = classify::message_contains::<std::io::Error>(["not yet assumable"]);
//! let err = std::io::Error::other("role is not yet assumable by service");
//! assert!(by_message(&err).is_retryable());
//! ```

use regex::Regex;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Verdict of a classifier for one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Transient; the operation may be attempted again.
    Retryable,
    /// Permanent or unknown; fail the session immediately.
    NonRetryable,
}

impl Classification {
    /// Whether the error should be retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, Classification::Retryable)
    }
}

impl From<bool> for Classification {
    fn from(retryable: bool) -> Self {
        if retryable {
            Classification::Retryable
        } else {
            Classification::NonRetryable
        }
    }
}

/// A shareable classifier for errors of type `E`.
pub type Classifier<E> = Arc<dyn Fn(&E) -> Classification + Send + Sync>;

/// Box a closure as a [`Classifier`].
pub fn classifier<E: 'static, F>(f: F) -> Classifier<E>
where
    F: Fn(&E) -> Classification + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Classifier that retries every error.
pub fn always<E: 'static>() -> Classifier<E> {
    Arc::new(|_: &E| Classification::Retryable)
}

/// Classifier that retries nothing.
pub fn never<E: 'static>() -> Classifier<E> {
    Arc::new(|_: &E| Classification::NonRetryable)
}

/// Retryable if any member classifier says so, NonRetryable otherwise.
///
/// An empty list recognizes nothing and therefore retries nothing.
pub fn any_of<E: 'static>(classifiers: impl IntoIterator<Item = Classifier<E>>) -> Classifier<E> {
    let classifiers: Vec<_> = classifiers.into_iter().collect();
    Arc::new(move |err: &E| {
        classifiers
            .iter()
            .any(|classify| classify(err).is_retryable())
            .into()
    })
}

/// Retryable if the error's message contains any of `needles`.
///
/// For call sites where the remote API only exposes a message, e.g.
/// `"The role defined for the function cannot be assumed"`.
pub fn message_contains<E: Display + 'static>(
    needles: impl IntoIterator<Item = impl Into<String>>,
) -> Classifier<E> {
    let needles: Vec<String> = needles.into_iter().map(Into::into).collect();
    Arc::new(move |err: &E| {
        let message = err.to_string();
        needles
            .iter()
            .any(|needle| message.contains(needle.as_str()))
            .into()
    })
}

/// Retryable if the error's message matches `pattern`.
pub fn message_matches<E: Display + 'static>(pattern: Regex) -> Classifier<E> {
    Arc::new(move |err: &E| pattern.is_match(&err.to_string()).into())
}

/// An error the operation has already classified itself.
///
/// Operations that know at the call site whether a failure is transient can
/// return `RetryOn<E>` and use [`self_classified`] as the classifier.
#[derive(Debug, Error)]
pub enum RetryOn<E> {
    /// Transient failure.
    #[error(transparent)]
    Retryable(E),
    /// Permanent failure.
    #[error(transparent)]
    NonRetryable(E),
}

impl<E> RetryOn<E> {
    /// The classification the operation attached.
    pub fn classification(&self) -> Classification {
        match self {
            RetryOn::Retryable(_) => Classification::Retryable,
            RetryOn::NonRetryable(_) => Classification::NonRetryable,
        }
    }

    /// Drop the classification and return the wrapped error.
    pub fn into_inner(self) -> E {
        match self {
            RetryOn::Retryable(e) | RetryOn::NonRetryable(e) => e,
        }
    }
}

/// Classifier for [`RetryOn`] errors: trusts the operation's own verdict.
pub fn self_classified<E: 'static>() -> Classifier<RetryOn<E>> {
    Arc::new(RetryOn::classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, Error, PartialEq)]
    enum ApiError {
        #[error("Throttling: rate exceeded")]
        Throttled,
        #[error("InvalidParameterValue: {0}")]
        InvalidParameter(String),
        #[error("AccessDenied")]
        AccessDenied,
    }

    #[test]
    fn test_bool_conversion() {
        assert_eq!(Classification::from(true), Classification::Retryable);
        assert_eq!(Classification::from(false), Classification::NonRetryable);
        assert!(Classification::Retryable.is_retryable());
        assert!(!Classification::NonRetryable.is_retryable());
    }

    #[test]
    fn test_always_and_never() {
        assert!(always::<ApiError>()(&ApiError::AccessDenied).is_retryable());
        assert!(!never::<ApiError>()(&ApiError::Throttled).is_retryable());
    }

    #[rstest]
    #[case(ApiError::Throttled, Classification::Retryable)]
    #[case(
        ApiError::InvalidParameter("The role defined for the function cannot be assumed by Lambda".into()),
        Classification::Retryable
    )]
    #[case(
        ApiError::InvalidParameter("Runtime not supported".into()),
        Classification::NonRetryable
    )]
    #[case(ApiError::AccessDenied, Classification::NonRetryable)]
    fn test_any_of_defaults_to_non_retryable(
        #[case] err: ApiError,
        #[case] expected: Classification,
    ) {
        let throttling = classifier(|e: &ApiError| matches!(e, ApiError::Throttled).into());
        let propagation = message_contains(["cannot be assumed"]);
        let classify = any_of([throttling, propagation]);

        assert_eq!(classify(&err), expected);
    }

    #[test]
    fn test_any_of_empty_retries_nothing() {
        let classify = any_of::<ApiError>(Vec::new());
        assert_eq!(classify(&ApiError::Throttled), Classification::NonRetryable);
    }

    #[test]
    fn test_message_matches() {
        let classify =
            message_matches::<ApiError>(Regex::new(r"^Throttling|RequestLimitExceeded").unwrap());

        assert!(classify(&ApiError::Throttled).is_retryable());
        assert!(!classify(&ApiError::AccessDenied).is_retryable());
    }

    #[test]
    fn test_retry_on_self_classified() {
        let classify = self_classified::<ApiError>();

        let transient = RetryOn::Retryable(ApiError::Throttled);
        let permanent = RetryOn::NonRetryable(ApiError::AccessDenied);

        assert!(classify(&transient).is_retryable());
        assert!(!classify(&permanent).is_retryable());
        assert_eq!(transient.to_string(), "Throttling: rate exceeded");
        assert_eq!(permanent.into_inner(), ApiError::AccessDenied);
    }
}
