//! Probe results and helpers for writing probe closures.
//!
//! A probe reads the current remote state once per poll cycle and reports
//! it as a [`ProbeResult`]. Transport and API failures travel in the
//! probe's `Result::Err`, separate from a resource that reports a failed
//! lifecycle state.

use std::future::Future;

/// Snapshot of a remote resource taken by one probe invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult<T> {
    /// The resource as last read, or `None` if it does not (yet) exist.
    pub object: Option<T>,
    /// Lifecycle state as reported by the remote system.
    pub state: String,
}

impl<T> ProbeResult<T> {
    /// A resource that exists and reports `state`.
    pub fn new(object: T, state: impl Into<String>) -> Self {
        Self {
            object: Some(object),
            state: state.into(),
        }
    }

    /// A resource that does not exist.
    ///
    /// Deletion waits use this as their synthetic target result: with an
    /// empty target set, an absent resource is success.
    pub fn absent() -> Self {
        Self {
            object: None,
            state: String::new(),
        }
    }

    /// A lookup that may or may not have found the resource.
    ///
    /// `state_of` is only consulted when the resource was found.
    pub fn from_lookup<F>(object: Option<T>, state_of: F) -> Self
    where
        F: FnOnce(&T) -> String,
    {
        match object {
            Some(object) => {
                let state = state_of(&object);
                Self::new(object, state)
            }
            None => Self::absent(),
        }
    }

    /// Whether the probe found no resource.
    pub fn is_absent(&self) -> bool {
        self.object.is_none()
    }
}

/// Run a probe future, turning a not-found error into an absent result.
///
/// Remote read APIs usually report a deleted resource as an error. A
/// deletion wait must see that as convergence rather than as a transient
/// read failure, otherwise it would poll until timeout.
///
/// # Examples
///
/// ```rust
/// use converge_core::probe::{absent_on, ProbeResult};
///
/// #[derive(Debug)]
/// enum ApiError {
///     NotFound,
///     Throttled,
/// }
///
/// # tokio_test::block_on(async {
/// let gone = absent_on(
///     async { Err::<ProbeResult<()>, _>(ApiError::NotFound) },
///     |e: &ApiError| matches!(e, ApiError::NotFound),
/// )
/// .await;
/// assert!(gone.unwrap().is_absent());
///
/// let throttled = absent_on(
///     async { Err::<ProbeResult<()>, _>(ApiError::Throttled) },
///     |e: &ApiError| matches!(e, ApiError::NotFound),
/// )
/// .await;
/// assert!(throttled.is_err());
/// # });
/// ```
pub async fn absent_on<T, E, Fut, N>(probe: Fut, is_not_found: N) -> Result<ProbeResult<T>, E>
where
    Fut: Future<Output = Result<ProbeResult<T>, E>>,
    N: FnOnce(&E) -> bool,
{
    match probe.await {
        Err(err) if is_not_found(&err) => Ok(ProbeResult::absent()),
        other => other,
    }
}
