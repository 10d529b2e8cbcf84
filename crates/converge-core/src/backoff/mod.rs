//! Backoff policies shared by the retry executor and the state poller.
//!
//! The interval before attempt `n + 1` (0-indexed after the first attempt)
//! is produced by a [`BackoffPolicy`]. The default policy grows
//! geometrically from a floor to a cap:
//!
//! ```text
//! interval(n) = min(min_interval * multiplier^n, max_interval)
//! ```
//!
//! # Examples
//!
//! ```rust
//! use converge_core::backoff::{BackoffPolicy, ExponentialBackoff};
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::builder()
//!     .min_interval(Duration::from_millis(500))
//!     .max_interval(Duration::from_secs(10))
//!     .build();
//!
//! assert_eq!(backoff.next_delay(0), Duration::from_millis(500));
//! assert_eq!(backoff.next_delay(1), Duration::from_secs(1));
//! assert_eq!(backoff.next_delay(10), Duration::from_secs(10));
//! ```

mod exponential;
mod fixed;
mod policy;

pub use exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use fixed::FixedBackoff;
pub use policy::BackoffPolicy;
