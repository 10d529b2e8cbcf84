//! State poller: wait until a remote resource converges on a target state.
//!
//! The poller calls a probe once per cycle and routes the observed state:
//!
//! | observation                         | outcome                               |
//! |-------------------------------------|---------------------------------------|
//! | probe error                         | transient, poll again                 |
//! | state in `target`                   | done, return the object               |
//! | state in `pending`                  | poll again after the backoff interval |
//! | any other state                     | fail with [`Error::UnexpectedState`]  |
//! | absent object, empty `target`       | done, return `None` (deletion wait)   |
//! | absent object, non-empty `target`   | not yet visible, poll again           |
//!
//! The state is checked first, with or without an object; the two "absent"
//! rows only apply to [`ProbeResult::absent`], whose state is empty.
//!
//! Every cycle is bounded by the session deadline; a resource still
//! converging when the deadline passes fails with [`Error::Timeout`].
//!
//! # Examples
//!
//! ```rust
//! use converge_core::{ProbeResult, WaitSpec};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = WaitSpec::builder()
//!     .resource("nat gateway nat-0abc")
//!     .pending(["pending"])
//!     .target(["available"])
//!     .timeout(Duration::from_secs(600))
//!     .delay(Duration::from_secs(10))
//!     .min_poll_interval(Duration::from_secs(5))
//!     .build()?;
//!
//! let gateway = spec
//!     .wait_for(|| async { Ok::<_, std::io::Error>(ProbeResult::new("nat-0abc", "available")) })
//!     .await?;
//! assert_eq!(gateway, Some("nat-0abc"));
//! # Ok(())
//! # }
//! ```

use crate::backoff::{BackoffPolicy, ExponentialBackoff, FixedBackoff};
use crate::classify::Classifier;
use crate::clock::{Deadline, pause};
use crate::error::{ConfigError, Error, Result};
use crate::probe::ProbeResult;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Immutable configuration for one polling session.
#[derive(Debug, Clone)]
pub struct WaitSpec {
    resource: String,
    pending: BTreeSet<String>,
    target: BTreeSet<String>,
    timeout: Duration,
    delay: Duration,
    backoff: Arc<dyn BackoffPolicy>,
    not_found_checks: u32,
    target_occurrences: u32,
    cancel: Option<CancellationToken>,
}

/// Per-session counters that decide when the poller stops.
#[derive(Debug, Default)]
struct Progress {
    not_found: u32,
    target_seen: u32,
}

/// What one successful probe means for the session.
enum Verdict<T> {
    Converged(Option<T>),
    Continue,
    Unexpected(String),
    NotFound(u32),
}

impl WaitSpec {
    /// Create a new builder for a polling session.
    pub fn builder() -> WaitSpecBuilder {
        WaitSpecBuilder::default()
    }

    /// States considered still converging.
    pub fn pending(&self) -> &BTreeSet<String> {
        &self.pending
    }

    /// States considered success.
    pub fn target(&self) -> &BTreeSet<String> {
        &self.target
    }

    /// Maximum wall-clock duration of the session.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pause before the first probe.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Poll `probe` until the resource converges, fails, or the deadline
    /// passes. Every probe error is treated as transient.
    ///
    /// Returns the object from the converging probe, or `None` when the
    /// resource converged by disappearing.
    pub async fn wait_for<T, E, F, Fut>(&self, probe: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<ProbeResult<T>, E>>,
        E: Display,
    {
        self.poll(probe, None).await
    }

    /// Like [`wait_for`](Self::wait_for), but probe errors that `classifier`
    /// rejects end the session with [`Error::NonRetryable`].
    pub async fn wait_for_classified<T, E, F, Fut>(
        &self,
        classifier: &Classifier<E>,
        probe: F,
    ) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<ProbeResult<T>, E>>,
        E: Display,
    {
        self.poll(probe, Some(classifier)).await
    }

    async fn poll<T, E, F, Fut>(
        &self,
        mut probe: F,
        classifier: Option<&Classifier<E>>,
    ) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<ProbeResult<T>, E>>,
        E: Display,
    {
        let deadline = Deadline::start(self.timeout);
        let cancel = self.cancel.as_ref();

        if !self.delay.is_zero() {
            trace!(resource = %self.resource, delay_ms = self.delay.as_millis(), "Waiting before first probe");
            if !pause(self.delay, cancel).await {
                return Err(Error::Cancelled);
            }
        }

        let mut progress = Progress::default();
        let mut last_state: Option<String> = None;
        let mut last_error: Option<E>;
        let mut attempt: u32 = 0;

        loop {
            match probe().await {
                Err(err) => {
                    if let Some(classify) = classifier {
                        if !classify(&err).is_retryable() {
                            warn!(
                                resource = %self.resource,
                                attempt = attempt + 1,
                                error = %err,
                                "Probe failed with non-retryable error"
                            );
                            return Err(Error::NonRetryable { cause: err });
                        }
                    }
                    debug!(
                        resource = %self.resource,
                        attempt = attempt + 1,
                        error = %err,
                        "Probe failed, will poll again"
                    );
                    progress.target_seen = 0;
                    last_error = Some(err);
                }
                Ok(ProbeResult { object, state }) => {
                    last_error = None;
                    trace!(
                        resource = %self.resource,
                        attempt = attempt + 1,
                        state = %state,
                        absent = object.is_none(),
                        "Probe observed state"
                    );

                    match self.observe(&mut progress, object, &state) {
                        Verdict::Converged(object) => {
                            debug!(
                                resource = %self.resource,
                                state = %state,
                                probes = attempt + 1,
                                elapsed_ms = deadline.elapsed().as_millis(),
                                "Resource converged"
                            );
                            return Ok(object);
                        }
                        Verdict::Unexpected(observed) => {
                            warn!(
                                resource = %self.resource,
                                state = %observed,
                                expected = ?self.target,
                                "Resource entered unexpected state"
                            );
                            return Err(Error::UnexpectedState {
                                observed,
                                expected: self.expected(),
                            });
                        }
                        Verdict::NotFound(checks) => {
                            warn!(
                                resource = %self.resource,
                                checks,
                                "Resource not found"
                            );
                            return Err(Error::NotFound { checks });
                        }
                        Verdict::Continue => {}
                    }
                    last_state = Some(state);
                }
            }

            if deadline.expired() {
                warn!(
                    resource = %self.resource,
                    probes = attempt + 1,
                    last_state = ?last_state,
                    timeout_ms = self.timeout.as_millis(),
                    "Timed out waiting for resource"
                );
                return Err(Error::Timeout {
                    last_state,
                    last_error,
                    timeout: self.timeout,
                    expected: self.expected(),
                });
            }

            let delay = self.backoff.next_delay(attempt).min(deadline.remaining());
            debug!(
                resource = %self.resource,
                attempt = attempt + 1,
                state = ?last_state,
                delay_ms = delay.as_millis(),
                "Resource not converged yet"
            );
            if !pause(delay, cancel).await {
                return Err(Error::Cancelled);
            }
            attempt += 1;
        }
    }

    /// Route one successful probe through the pending/target partition.
    ///
    /// The reported state decides; only the synthetic absent result (no
    /// object, empty state) takes the not-found path.
    fn observe<T>(&self, progress: &mut Progress, object: Option<T>, state: &str) -> Verdict<T> {
        if self.target.contains(state) {
            progress.not_found = 0;
            return self.hit_target(progress, object);
        }
        if self.pending.contains(state) {
            progress.not_found = 0;
            progress.target_seen = 0;
            return Verdict::Continue;
        }

        match object {
            None if state.is_empty() && self.target.is_empty() => {
                progress.not_found = 0;
                self.hit_target(progress, None)
            }
            None if state.is_empty() => {
                progress.target_seen = 0;
                progress.not_found += 1;
                if progress.not_found > self.not_found_checks {
                    Verdict::NotFound(progress.not_found)
                } else {
                    Verdict::Continue
                }
            }
            _ => Verdict::Unexpected(state.to_string()),
        }
    }

    fn hit_target<T>(&self, progress: &mut Progress, object: Option<T>) -> Verdict<T> {
        progress.target_seen += 1;
        if progress.target_seen >= self.target_occurrences {
            Verdict::Converged(object)
        } else {
            Verdict::Continue
        }
    }

    fn expected(&self) -> Vec<String> {
        self.target.iter().cloned().collect()
    }
}

/// Poll `probe` under `spec`. Equivalent to [`WaitSpec::wait_for`].
pub async fn wait_for<T, E, F, Fut>(spec: WaitSpec, probe: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<ProbeResult<T>, E>>,
    E: Display,
{
    spec.wait_for(probe).await
}

/// Builder for [`WaitSpec`].
///
/// `timeout` is required; `pending` and `target` must not share a state.
#[derive(Debug, Default)]
pub struct WaitSpecBuilder {
    resource: Option<String>,
    pending: BTreeSet<String>,
    target: BTreeSet<String>,
    timeout: Option<Duration>,
    delay: Option<Duration>,
    min_poll_interval: Option<Duration>,
    max_poll_interval: Option<Duration>,
    poll_interval: Option<Duration>,
    backoff: Option<Arc<dyn BackoffPolicy>>,
    not_found_checks: Option<u32>,
    target_occurrences: Option<u32>,
    cancel: Option<CancellationToken>,
}

impl WaitSpecBuilder {
    /// Label used in log events, e.g. `"db instance mydb"`.
    ///
    /// Default: `"resource"`
    pub fn resource(mut self, name: impl Into<String>) -> Self {
        self.resource = Some(name.into());
        self
    }

    /// Add states considered still converging.
    pub fn pending<S: Into<String>>(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.pending.extend(states.into_iter().map(Into::into));
        self
    }

    /// Add states considered success.
    ///
    /// Leave empty for deletion waits, where an absent resource is success.
    pub fn target<S: Into<String>>(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.target.extend(states.into_iter().map(Into::into));
        self
    }

    /// Maximum wall-clock duration of the session. Required.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Pause before the first probe, letting a just-submitted mutation
    /// propagate.
    ///
    /// Default: zero
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Floor on the spacing between probes.
    ///
    /// Default: 100ms
    pub fn min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = Some(interval);
        self
    }

    /// Cap on the spacing between probes as backoff grows.
    ///
    /// Default: 10s
    pub fn max_poll_interval(mut self, interval: Duration) -> Self {
        self.max_poll_interval = Some(interval);
        self
    }

    /// Poll at a fixed interval instead of backing off. Still floored at
    /// the minimum poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Use a custom backoff policy. Overrides the interval settings.
    pub fn backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Consecutive absent observations tolerated while waiting for a
    /// resource to become visible.
    ///
    /// Default: 20
    pub fn not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = Some(checks);
        self
    }

    /// Consecutive target observations required before success.
    ///
    /// Default: 1
    pub fn target_occurrences(mut self, occurrences: u32) -> Self {
        self.target_occurrences = Some(occurrences);
        self
    }

    /// Stop the session early when `token` is cancelled.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate and build the spec.
    pub fn build(self) -> std::result::Result<WaitSpec, ConfigError> {
        let timeout = self.timeout.ok_or(ConfigError::MissingTimeout)?;

        if let Some(state) = self.pending.intersection(&self.target).next() {
            return Err(ConfigError::OverlappingStates(state.clone()));
        }

        let target_occurrences = self.target_occurrences.unwrap_or(1);
        if target_occurrences == 0 {
            return Err(ConfigError::ZeroTargetOccurrences);
        }

        let min_poll_interval = self
            .min_poll_interval
            .unwrap_or(Duration::from_millis(100));

        let backoff: Arc<dyn BackoffPolicy> = match (self.backoff, self.poll_interval) {
            (Some(backoff), _) => backoff,
            (None, Some(interval)) => Arc::new(FixedBackoff::new(interval.max(min_poll_interval))),
            (None, None) => Arc::new(
                ExponentialBackoff::builder()
                    .min_interval(min_poll_interval)
                    .max_interval(self.max_poll_interval.unwrap_or(Duration::from_secs(10)))
                    .build(),
            ),
        };

        Ok(WaitSpec {
            resource: self.resource.unwrap_or_else(|| "resource".to_string()),
            pending: self.pending,
            target: self.target,
            timeout,
            delay: self.delay.unwrap_or_default(),
            backoff,
            not_found_checks: self.not_found_checks.unwrap_or(20),
            target_occurrences,
            cancel: self.cancel,
        })
    }
}
