use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Per-source request pacing: callers sleep until `1/rps` has elapsed
/// since the previous request. Concurrent callers share the limit through
/// the internal mutex, so bursts serialize instead of stampeding an API.
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn per_second(rps: f64) -> Self {
        let interval = if rps > 0.0 {
            Duration::from_secs_f64(1.0 / rps)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Wait until this source may issue its next request.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        let now = Instant::now();
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_consecutive_requests() {
        let limiter = RateLimiter::per_second(10.0); // 100ms apart
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn zero_rate_never_blocks() {
        let limiter = RateLimiter::per_second(0.0);
        limiter.acquire().await;
        limiter.acquire().await;
    }
}
