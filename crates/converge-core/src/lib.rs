#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Convergence engine for eventually consistent control planes.
//!
//! Resource adapters issue a mutating call against a remote API and then
//! need to wait until the remote resource actually reaches the state they
//! asked for. This crate provides the two primitives every such adapter
//! needs:
//!
//! - **Retry executor** ([`retry()`], [`RetrySpec`]) - repeat a fallible
//!   operation until it succeeds, fails permanently, or exhausts its budget,
//!   with one final grace attempt after the deadline
//! - **State poller** ([`wait_for()`], [`WaitSpec`]) - probe a resource until
//!   its state is in a target set, fast-failing on states outside
//!   `pending ∪ target`
//!
//! Both share the [`backoff`] policies and report failures through one
//! structurally matchable [`Error`] type. Whether an error is worth retrying
//! is decided per call site by a [`classify`] function.
//!
//! Every session is configured by a spec value built fresh at the call site;
//! the engine holds no global state, so any number of sessions can run
//! concurrently.
//!
//! # Examples
//!
//! Waiting for a volume to be deleted, where "not found" means done:
//!
//! ```rust
//! use converge_core::prelude::*;
//! use std::time::Duration;
//!
//! #[derive(Debug, thiserror::Error)]
//! enum ApiError {
//!     #[error("InvalidVolume.NotFound")]
//!     NotFound,
//! }
//!
//! async fn describe_volume(_id: &str) -> Result<ProbeResult<String>, ApiError> {
//!     Err(ApiError::NotFound)
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = WaitSpec::builder()
//!     .resource("volume vol-0abc")
//!     .pending(["in-use", "available", "deleting"])
//!     .timeout(Duration::from_secs(300))
//!     .delay(Duration::from_secs(2))
//!     .build()?;
//!
//! let gone = spec
//!     .wait_for(|| absent_on(describe_volume("vol-0abc"), |e| matches!(e, ApiError::NotFound)))
//!     .await?;
//! assert!(gone.is_none());
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod classify;
mod clock;
pub mod error;
pub mod probe;
pub mod retry;
pub mod timeouts;
pub mod wait;

pub use classify::{Classification, Classifier};
pub use error::{ConfigError, Error, Result};
pub use probe::ProbeResult;
pub use retry::{RetrySpec, RetrySpecBuilder, retry};
pub use wait::{WaitSpec, WaitSpecBuilder, wait_for};

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use converge_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backoff::{BackoffPolicy, ExponentialBackoff, FixedBackoff};
    pub use crate::classify::{self, Classification, Classifier, RetryOn};
    pub use crate::error::{ConfigError, Error};
    pub use crate::probe::{ProbeResult, absent_on};
    pub use crate::retry::{RetrySpec, retry};
    pub use crate::timeouts::{Operation, ResourceTimeouts};
    pub use crate::wait::{WaitSpec, wait_for};
}
