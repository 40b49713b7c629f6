//! Client-side request pacing
//!
//! Uses the governor crate for token bucket rate limiting. This is a local
//! smoothing aid only; the server's quota is enforced by
//! [`RateGovernor`](crate::quota::RateGovernor) and 429s by the backoff policy.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum number of requests per minute
    pub requests_per_minute: u32,
    /// Burst size (max tokens in bucket)
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 600,
            burst_size: 10,
        }
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter config
    pub fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size,
        }
    }

    /// Pace evenly at `requests_per_minute` with a burst of one tenth of that
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size: (requests_per_minute / 10).max(1),
        }
    }
}

/// Token bucket rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimiterConfig) -> Self {
        let one = NonZeroU32::MIN;
        let quota = Quota::per_minute(NonZeroU32::new(config.requests_per_minute).unwrap_or(one))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(one));

        Self {
            limiter: Arc::new(Governor::direct(quota)),
        }
    }

    /// Wait until a request can be made
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_rate_limiter_config_per_minute() {
        let config = RateLimiterConfig::per_minute(120);
        assert_eq!(config.requests_per_minute, 120);
        assert_eq!(config.burst_size, 12);

        let tiny = RateLimiterConfig::per_minute(5);
        assert_eq!(tiny.burst_size, 1);
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_burst_then_blocks() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(60, 3));

        for _ in 0..3 {
            let mut wait = task::spawn(limiter.wait());
            assert_ready!(wait.poll());
        }
        let mut blocked = task::spawn(limiter.wait());
        assert_pending!(blocked.poll());
    }

    #[tokio::test]
    async fn test_rate_limiter_zero_config_still_builds() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(0, 0));
        let mut wait = task::spawn(limiter.wait());
        assert_ready!(wait.poll());
    }
}
