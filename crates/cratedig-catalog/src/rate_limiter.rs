// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Single-host rate limiter enforcing a minimum inter-request interval,
/// shared across every caller so concurrent requests serialise politely
/// instead of bursting (spec §4.1).
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    next_allowed: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Claims the next free slot and sleeps until it arrives, aborting
    /// immediately if `cancel` fires while waiting.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let wait = {
            let mut next = self.next_allowed.lock().await;
            let now = Instant::now();
            let claim_at = (*next).max(now);
            *next = claim_at + self.min_interval;
            claim_at.saturating_duration_since(now)
        };

        if wait.is_zero() {
            return Ok(());
        }

        tokio::select! {
            _ = sleep(wait) => Ok(()),
            _ = cancel.cancelled() => Err(Cancelled),
        }
    }

    /// Pushes the shared next-allowed slot forward by `delay` from now,
    /// honoring an upstream `Retry-After` hint. Never moves it backwards.
    pub async fn push_back(&self, delay: Duration) {
        let candidate = Instant::now() + delay;
        let mut next = self.next_allowed.lock().await;
        if candidate > *next {
            *next = candidate;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cancelled")
    }
}

impl std::error::Error for Cancelled {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enforces_minimum_interval_between_claims() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));

        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        cancel.cancel();
        let result = limiter.acquire(&cancel).await;
        assert_eq!(result, Err(Cancelled));
    }

    #[tokio::test]
    async fn push_back_only_moves_forward() {
        let limiter = RateLimiter::new(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        limiter.push_back(Duration::from_millis(200)).await;
        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));
    }
}
