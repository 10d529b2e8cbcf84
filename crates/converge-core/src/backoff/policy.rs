use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Computes the pause between consecutive attempts of one session.
///
/// Policies are stateless: the attempt index is passed in, so a single
/// policy value can drive any number of concurrent sessions.
///
/// # Examples
///
/// ```rust
/// use converge_core::backoff::BackoffPolicy;
/// use std::time::Duration;
///
/// /// Linear growth, one second per attempt.
/// #[derive(Debug)]
/// struct Linear;
///
/// impl BackoffPolicy for Linear {
///     fn next_delay(&self, attempt: u32) -> Duration {
///         Duration::from_secs(u64::from(attempt) + 1)
///     }
/// }
///
/// assert_eq!(Linear.next_delay(2), Duration::from_secs(3));
/// ```
pub trait BackoffPolicy: Debug + Send + Sync {
    /// Delay to wait after attempt `attempt` (0-indexed) before the next one.
    ///
    /// Never returns zero for the first attempt of a well-formed policy: the
    /// first interval is always observed, even for near-instant convergence.
    fn next_delay(&self, attempt: u32) -> Duration;
}

impl<P: BackoffPolicy + ?Sized> BackoffPolicy for Arc<P> {
    fn next_delay(&self, attempt: u32) -> Duration {
        (**self).next_delay(attempt)
    }
}

impl<P: BackoffPolicy + ?Sized> BackoffPolicy for Box<P> {
    fn next_delay(&self, attempt: u32) -> Duration {
        (**self).next_delay(attempt)
    }
}
