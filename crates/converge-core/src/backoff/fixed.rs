use super::policy::BackoffPolicy;
use std::time::Duration;

/// Constant spacing between attempts.
///
/// Used when a call site pins an explicit poll interval instead of letting
/// the exponential policy grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    interval: Duration,
}

impl FixedBackoff {
    /// Create a policy that always waits `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl BackoffPolicy for FixedBackoff {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.interval
    }
}
