//! Rate limiting for classifier calls
//!
//! Sliding window limiter: at most `max_calls` calls start within any
//! `window`. Callers over the limit sleep until the oldest call leaves the
//! window instead of being rejected.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

/// Sliding window rate limiter
pub struct SlidingWindowLimiter {
    /// Start times of calls still inside the window, oldest first
    calls: Mutex<VecDeque<Instant>>,
    /// Maximum calls allowed in the window
    max_calls: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl SlidingWindowLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_calls` - Maximum number of calls allowed in the window
    /// * `window` - Duration of the sliding window
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            calls: Mutex::new(VecDeque::new()),
            max_calls: max_calls.max(1),
            window,
        }
    }

    /// Wait until a call is allowed, then record it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                Self::evict(&mut calls, now, self.window);

                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    info!(
                        "[RateLimit] {}/{} calls in the last {:?}",
                        calls.len(),
                        self.max_calls,
                        self.window
                    );
                    return;
                }

                // Oldest call leaves the window at `oldest + window`
                match calls.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            warn!(
                "[RateLimit] Limit reached. Waiting {:.2}s before next call",
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn evict(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        // Default: 14 calls per 60 seconds
        Self::new(14, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_calls_under_limit_do_not_wait() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_over_limit_blocks() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;

        let third = tokio::time::timeout(Duration::from_secs(30), limiter.acquire()).await;
        assert!(third.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_sleeps_until_window_frees() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        // Third call has to wait for the first to age out
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(1));
        limiter.acquire().await;

        tokio::time::advance(Duration::from_millis(1100)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
