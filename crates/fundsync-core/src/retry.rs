//! Retry backoff and request pacing shared by all provider adapters.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Retry budget and backoff schedule for upstream requests.
///
/// Rate-limit responses (HTTP 429) back off twice as hard as other transient
/// failures; both scale linearly with the attempt number.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts per request, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Backoff to sleep after a failed attempt (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32, rate_limited: bool) -> Duration {
        let base_ms = if rate_limited { 2000 } else { 1000 };
        Duration::from_millis(base_ms * u64::from(attempt))
    }
}

/// Serializes a provider's requests to honor its private rate limit.
///
/// Each adapter owns one pacer; callers await [`RequestPacer::wait`] before
/// every request. The first request goes through immediately.
#[derive(Debug)]
pub struct RequestPacer {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RequestPacer {
    /// Creates a pacer with a fixed minimum interval between requests.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Creates a pacer from a requests-per-minute budget.
    #[must_use]
    pub fn per_minute(requests: u64) -> Self {
        Self::new(Duration::from_millis(60_000 / requests.max(1)))
    }

    /// Waits until the provider's inter-request delay has elapsed.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_scales_with_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1, false), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2, false), Duration::from_millis(2000));
        assert_eq!(policy.backoff(1, true), Duration::from_millis(2000));
        assert_eq!(policy.backoff(3, true), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_enforces_min_interval() {
        let pacer = RequestPacer::new(Duration::from_millis(500));

        let start = Instant::now();
        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
