//! Exponential backoff with an interval floor, a cap and optional jitter.

use super::policy::BackoffPolicy;
use std::time::Duration;

/// Exponential backoff strategy with configurable jitter.
///
/// Delays between attempts grow as `min_interval * multiplier^attempt`,
/// capped at `max_interval` and never dropping below `min_interval`.
///
/// # Mathematical Formula
///
/// For attempt `n` (0-indexed after the first attempt):
/// ```text
/// base_delay = min_interval * (multiplier ^ n)
/// jittered = base_delay + random(-jitter, +jitter) * base_delay
/// final_delay = clamp(jittered, min_interval, max_interval)
/// ```
///
/// With the default jitter of `0.0` the schedule is fully deterministic.
///
/// # Examples
///
/// ```rust
/// use converge_core::backoff::{BackoffPolicy, ExponentialBackoff};
/// use std::time::Duration;
///
/// // Default configuration (min=100ms, max=10s, multiplier=2.0, jitter=0.0)
/// let backoff = ExponentialBackoff::default();
/// assert_eq!(backoff.next_delay(0), Duration::from_millis(100));
///
/// // Custom configuration
/// let backoff = ExponentialBackoff::builder()
///     .min_interval(Duration::from_secs(1))
///     .max_interval(Duration::from_secs(30))
///     .multiplier(1.5)
///     .jitter(0.1)
///     .build();
/// # let _ = backoff;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    min_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new builder for configuring exponential backoff.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Floor applied to every interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Cap applied to every interval.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }
}

impl Default for ExponentialBackoff {
    /// Defaults:
    /// - `min_interval`: 100ms
    /// - `max_interval`: 10s
    /// - `multiplier`: 2.0 (doubles each time)
    /// - `jitter`: 0.0
    fn default() -> Self {
        ExponentialBackoffBuilder::default().build()
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = self.min_interval.as_secs_f64() * self.multiplier.powi(exponent);

        let jittered = if self.jitter > 0.0 {
            // Uniform in [base * (1 - jitter), base * (1 + jitter)]
            let jitter_amount = base_delay * self.jitter * (rand::random::<f64>() - 0.5) * 2.0;
            base_delay + jitter_amount
        } else {
            base_delay
        };

        // Overflow (and the NaN it can produce with jitter) lands on the cap
        Duration::try_from_secs_f64(jittered)
            .unwrap_or(self.max_interval)
            .clamp(self.min_interval, self.max_interval)
    }
}

/// Builder for configuring [`ExponentialBackoff`].
///
/// # Examples
///
/// ```rust
/// use converge_core::backoff::ExponentialBackoff;
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::builder()
///     .min_interval(Duration::from_millis(500))
///     .max_interval(Duration::from_secs(30))
///     .multiplier(2.0)
///     .jitter(0.1)
///     .build();
/// # let _ = backoff;
/// ```
#[derive(Debug, Default, Clone)]
pub struct ExponentialBackoffBuilder {
    min_interval: Option<Duration>,
    max_interval: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl ExponentialBackoffBuilder {
    /// Set the first interval, which is also the floor for every interval.
    ///
    /// Default: 100ms
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = Some(interval);
        self
    }

    /// Set the cap on the interval between attempts.
    ///
    /// Default: 10s
    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = Some(interval);
        self
    }

    /// Set the growth factor.
    ///
    /// Values below 1.0 are clamped to 1.0 so intervals never shrink.
    ///
    /// Default: 2.0
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier.max(1.0));
        self
    }

    /// Set the jitter factor (0.0 to 1.0).
    ///
    /// A jitter of 0.1 lets each interval vary by ±10% before the floor and
    /// cap are applied.
    ///
    /// Default: 0.0
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter.clamp(0.0, 1.0));
        self
    }

    /// Build the `ExponentialBackoff` instance.
    ///
    /// A cap lower than the floor is raised to the floor.
    pub fn build(self) -> ExponentialBackoff {
        let min_interval = self.min_interval.unwrap_or(Duration::from_millis(100));
        let max_interval = self
            .max_interval
            .unwrap_or(Duration::from_secs(10))
            .max(min_interval);

        ExponentialBackoff {
            min_interval,
            max_interval,
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(0.0),
        }
    }
}
