//! Deadline tracking and cancellable sleeps shared by both executors.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Wall-clock budget for one session, fixed at session start.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    timeout: Duration,
}

impl Deadline {
    pub(crate) fn start(timeout: Duration) -> Self {
        Self {
            start: Instant::now(),
            timeout,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub(crate) fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    pub(crate) fn expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }
}

/// Sleep for `delay`, returning `false` if `cancel` fired first.
pub(crate) async fn pause(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = token.cancelled() => false,
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_tracks_virtual_time() {
        let deadline = Deadline::start(Duration::from_secs(10));
        assert!(!deadline.expired());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(deadline.remaining(), Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_without_token_sleeps() {
        let start = Instant::now();
        assert!(pause(Duration::from_millis(250), None).await);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_observes_cancellation() {
        let token = CancellationToken::new();
        token.cancel();

        let start = Instant::now();
        assert!(!pause(Duration::from_secs(60), Some(&token)).await);
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
