//! Issuance throttling shared by every caller of one client.

use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces out call issuance so that at most `max_rps` calls start per second.
///
/// The lock is held across the wait, so the wait decision and the timestamp
/// update are a single step. Tokio's mutex is fair, which releases waiting
/// callers in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_issue: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// `max_rps` below 1 is treated as 1.
    pub fn new(max_rps: u32) -> Self {
        let max_rps = max_rps.max(1);
        Self {
            interval: Duration::from_secs_f64(1.0 / f64::from(max_rps)),
            last_issue: Mutex::new(None),
        }
    }

    /// Minimum spacing between two issued calls.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the caller may issue a call, then records the issuance.
    pub async fn acquire(&self) {
        let mut last_issue = self.last_issue.lock().await;

        if let Some(previous) = *last_issue {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!("Rate limiter: waiting {}ms before issuing", wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }

        *last_issue = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_interval_from_rps() {
        assert_eq!(RateLimiter::new(2).interval(), Duration::from_millis(500));
        assert_eq!(RateLimiter::new(10).interval(), Duration::from_millis(100));
        // Never disabled
        assert_eq!(RateLimiter::new(0).interval(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_never_waits() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_calls_are_spaced() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_has_passed() {
        let limiter = RateLimiter::new(2);
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_millis(600)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_do_not_burst() {
        let limiter = Arc::new(RateLimiter::new(4));
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap());
        }
        issued.sort();

        for pair in issued.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
