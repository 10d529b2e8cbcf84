//! Retry executor: run a fallible operation until it succeeds, fails
//! permanently, or exhausts its time budget.
//!
//! # Grace attempt
//!
//! When the budget runs out while the operation is still failing with
//! retryable errors, the executor makes exactly one more call, outside the
//! retry envelope: its error is not classified, and its outcome is final.
//! Remote control planes regularly resolve a transient condition (an IAM
//! role that is not yet assumable, a just-created subnet that is not yet
//! visible) a moment after the nominal timeout, and a single extra call
//! turns those into successes instead of spurious timeouts.
//!
//! # Examples
//!
//! ```rust
//! use converge_core::{classify, RetrySpec};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = RetrySpec::builder()
//!     .operation("create function")
//!     .timeout(Duration::from_secs(120))
//!     .classifier(classify::message_contains(["cannot be assumed"]))
//!     .build()?;
//!
//! let arn = spec
//!     .execute(|| async { Ok::<_, std::io::Error>("arn:aws:lambda:us-east-1:0:function:f") })
//!     .await?;
//! # let _ = arn;
//! # Ok(())
//! # }
//! ```

use crate::backoff::{BackoffPolicy, ExponentialBackoff};
use crate::classify::{self, Classification, Classifier};
use crate::clock::{Deadline, pause};
use crate::error::{ConfigError, Error, Result};
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Immutable configuration for one retry session.
pub struct RetrySpec<E> {
    operation: String,
    timeout: Duration,
    classifier: Classifier<E>,
    backoff: Arc<dyn BackoffPolicy>,
    cancel: Option<CancellationToken>,
}

impl<E> Clone for RetrySpec<E> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            timeout: self.timeout,
            classifier: Arc::clone(&self.classifier),
            backoff: Arc::clone(&self.backoff),
            cancel: self.cancel.clone(),
        }
    }
}

impl<E> fmt::Debug for RetrySpec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySpec")
            .field("operation", &self.operation)
            .field("timeout", &self.timeout)
            .field("classifier", &"<classifier>")
            .field("backoff", &self.backoff)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl<E> RetrySpec<E> {
    /// Create a new builder for a retry session.
    pub fn builder() -> RetrySpecBuilder<E> {
        RetrySpecBuilder::default()
    }

    /// Total time budget across all attempts.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Label used in log events.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Classify an error with this spec's classifier.
    pub fn classify(&self, err: &E) -> Classification {
        (self.classifier)(err)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// budget plus the grace attempt is exhausted.
    ///
    /// Attempts are strictly sequential. `op` is not deduplicated: it must
    /// be idempotent, or the caller accepts at-least-once semantics.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let deadline = Deadline::start(self.timeout);
        let mut attempt: u32 = 0;

        loop {
            let err = match op().await {
                Ok(value) => {
                    debug!(
                        operation = %self.operation,
                        attempts = attempt + 1,
                        elapsed_ms = deadline.elapsed().as_millis(),
                        "Operation succeeded"
                    );
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.classify(&err).is_retryable() {
                warn!(
                    operation = %self.operation,
                    attempt = attempt + 1,
                    error = %err,
                    "Operation failed with non-retryable error"
                );
                return Err(Error::NonRetryable { cause: err });
            }

            let remaining = deadline.remaining();
            let delay = self.backoff.next_delay(attempt);

            if deadline.expired() || delay >= remaining {
                debug!(
                    operation = %self.operation,
                    attempt = attempt + 1,
                    error = %err,
                    remaining_ms = remaining.as_millis(),
                    "Retry budget exhausted"
                );
                if !pause(remaining, self.cancel.as_ref()).await {
                    return Err(Error::Cancelled);
                }
                break;
            }

            debug!(
                operation = %self.operation,
                attempt = attempt + 1,
                error = %err,
                delay_ms = delay.as_millis(),
                "Operation failed, retrying"
            );
            if !pause(delay, self.cancel.as_ref()).await {
                return Err(Error::Cancelled);
            }
            attempt += 1;
        }

        self.grace_attempt(op, attempt + 1).await
    }

    /// The single unconditional call made once the budget is spent.
    async fn grace_attempt<T, F, Fut>(&self, mut op: F, attempts: u32) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        match op().await {
            Ok(value) => {
                debug!(
                    operation = %self.operation,
                    attempts = attempts + 1,
                    "Operation succeeded on final attempt after timeout"
                );
                Ok(value)
            }
            Err(err) => {
                warn!(
                    operation = %self.operation,
                    attempts = attempts + 1,
                    timeout_ms = self.timeout.as_millis(),
                    error = %err,
                    "Operation timed out"
                );
                Err(Error::Timeout {
                    last_state: None,
                    last_error: Some(err),
                    timeout: self.timeout,
                    expected: Vec::new(),
                })
            }
        }
    }
}

/// Run `op` under `spec`. Equivalent to [`RetrySpec::execute`].
pub async fn retry<T, E, F, Fut>(spec: RetrySpec<E>, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    spec.execute(op).await
}

/// Builder for [`RetrySpec`].
///
/// Only `timeout` is required. Unset knobs take the defaults documented on
/// each method.
pub struct RetrySpecBuilder<E> {
    operation: Option<String>,
    timeout: Option<Duration>,
    classifier: Option<Classifier<E>>,
    backoff: Option<Arc<dyn BackoffPolicy>>,
    cancel: Option<CancellationToken>,
}

impl<E> Default for RetrySpecBuilder<E> {
    fn default() -> Self {
        Self {
            operation: None,
            timeout: None,
            classifier: None,
            backoff: None,
            cancel: None,
        }
    }
}

impl<E: 'static> RetrySpecBuilder<E> {
    /// Label used in log events.
    ///
    /// Default: `"operation"`
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation = Some(name.into());
        self
    }

    /// Total time budget across all attempts. Required.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Decide which errors are retried.
    ///
    /// Default: [`classify::never`], so an unconfigured spec fails fast.
    pub fn classifier(mut self, classifier: Classifier<E>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Retry errors for which `predicate` returns `true`.
    pub fn retry_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier(classify::classifier(move |err: &E| predicate(err).into()))
    }

    /// Spacing between attempts.
    ///
    /// Default: exponential from 500ms, doubling, capped at 10s.
    pub fn backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Stop the session early when `token` is cancelled.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the spec.
    pub fn build(self) -> std::result::Result<RetrySpec<E>, ConfigError> {
        let timeout = self.timeout.ok_or(ConfigError::MissingTimeout)?;
        let backoff = self.backoff.unwrap_or_else(|| {
            Arc::new(
                ExponentialBackoff::builder()
                    .min_interval(Duration::from_millis(500))
                    .max_interval(Duration::from_secs(10))
                    .build(),
            )
        });

        Ok(RetrySpec {
            operation: self.operation.unwrap_or_else(|| "operation".to_string()),
            timeout,
            classifier: self.classifier.unwrap_or_else(classify::never),
            backoff,
            cancel: self.cancel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::FixedBackoff;
    use crate::classify::RetryOn;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;
    use tokio::time::Instant;

    #[derive(Debug, Error, PartialEq)]
    enum ApiError {
        #[error("InvalidParameterValue: role cannot be assumed")]
        RoleNotReady,
        #[error("AccessDenied")]
        AccessDenied,
    }

    fn propagation_spec(timeout: Duration) -> RetrySpec<ApiError> {
        RetrySpec::builder()
            .operation("create function")
            .timeout(timeout)
            .retry_if(|e: &ApiError| matches!(e, ApiError::RoleNotReady))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success() {
        let spec = propagation_spec(Duration::from_secs(30));
        let calls = AtomicU32::new(0);

        let result = spec
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ApiError>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_on_third_attempt() {
        let spec = propagation_spec(Duration::from_secs(30));
        let attempts = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = spec
            .execute(|| {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ApiError::RoleNotReady)
                    } else {
                        Ok("arn")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "arn");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 500ms + 1s of backoff
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_after_one_call() {
        let spec = propagation_spec(Duration::from_secs(30));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = spec
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::AccessDenied) }
            })
            .await;

        match result {
            Err(Error::NonRetryable { cause }) => assert_eq!(cause, ApiError::AccessDenied),
            other => panic!("Expected NonRetryable, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_classifier_fails_fast() {
        let spec = RetrySpec::<ApiError>::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = spec
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::RoleNotReady) }
            })
            .await;

        assert!(result.unwrap_err().is_non_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_attempt_after_timeout_succeeds() {
        let timeout = Duration::from_secs(5);
        let spec = propagation_spec(timeout);
        let start = Instant::now();
        let calls = AtomicU32::new(0);

        // Fails on every call made inside the budget, succeeds afterwards
        let result = spec
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                let within_budget = start.elapsed() < timeout;
                async move {
                    if within_budget {
                        Err(ApiError::RoleNotReady)
                    } else {
                        Ok("converged")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "converged");
        // 0s, 0.5s, 1.5s, 3.5s inside the budget, then the grace call at 5s
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_attempt_failure_is_timeout() {
        let timeout = Duration::from_secs(2);
        let spec = propagation_spec(timeout);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = spec
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::RoleNotReady) }
            })
            .await;

        match result {
            Err(Error::Timeout {
                last_error,
                timeout: budget,
                ..
            }) => {
                assert_eq!(last_error, Some(ApiError::RoleNotReady));
                assert_eq!(budget, timeout);
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
        // 0s, 0.5s, 1.5s, then grace at 2s
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_attempt_is_not_classified() {
        let spec = propagation_spec(Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = spec
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApiError::RoleNotReady)
                    } else {
                        Err(ApiError::AccessDenied)
                    }
                }
            })
            .await;

        // The grace call's error is reported as the timeout's cause, not as
        // a non-retryable failure.
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.into_cause(), Some(ApiError::AccessDenied));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_still_makes_grace_attempt() {
        let spec = propagation_spec(Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result = spec
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ApiError::RoleNotReady)
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_classified_errors() {
        let spec = RetrySpec::builder()
            .timeout(Duration::from_secs(10))
            .classifier(classify::self_classified())
            .backoff(FixedBackoff::new(Duration::from_secs(1)))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = spec
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(RetryOn::Retryable(ApiError::RoleNotReady))
                    } else {
                        Err(RetryOn::NonRetryable(ApiError::AccessDenied))
                    }
                }
            })
            .await;

        let cause = result.unwrap_err().into_cause().map(RetryOn::into_inner);
        assert_eq!(cause, Some(ApiError::AccessDenied));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_without_grace_attempt() {
        let token = CancellationToken::new();
        let spec = RetrySpec::builder()
            .timeout(Duration::from_secs(60))
            .retry_if(|_: &ApiError| true)
            .cancel_token(token.clone())
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = spec
            .execute(|| {
                if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                    token.cancel();
                }
                async { Err(ApiError::RoleNotReady) }
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_builder_requires_timeout() {
        let err = RetrySpec::<ApiError>::builder().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingTimeout);
    }

    #[test]
    fn test_builder_defaults() {
        let spec = RetrySpec::<ApiError>::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap();

        assert_eq!(spec.operation(), "operation");
        assert_eq!(spec.timeout(), Duration::from_secs(3));
        assert_eq!(spec.classify(&ApiError::RoleNotReady), Classification::NonRetryable);
        assert_eq!(spec.backoff.next_delay(0), Duration::from_millis(500));
        assert!(format!("{spec:?}").contains("RetrySpec"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_function_matches_method() {
        let result = retry(propagation_spec(Duration::from_secs(1)), || async {
            Ok::<_, ApiError>("ok")
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
    }
}
