//! Exponential backoff on retriable outcomes
//!
//! On `RateLimited` or `UpstreamTimeout` the policy sleeps the current delay,
//! multiplies it, and tries again. With the defaults a permanently throttled
//! endpoint costs 2 + 4 + 8 + 16 + 32 = 62 seconds before the call gives up.

use super::transport::{Outcome, RawResponse};
use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry schedule for retriable HTTP outcomes
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Attempts before giving up
    pub max_attempts: u32,
    /// First sleep
    pub initial_delay: Duration,
    /// Factor applied to the delay after every retriable outcome
    pub multiplier: f64,
    /// Cap on any single sleep
    pub max_delay: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: None,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy. `max_attempts` is raised to at least one.
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            multiplier: if multiplier.is_finite() && multiplier > 0.0 {
                multiplier
            } else {
                1.0
            },
            max_delay: None,
        }
    }

    /// Cap every sleep at `max_delay`
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Sleep that follows the given zero-based attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Every sleep the policy will perform against a permanently throttled endpoint
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts).map(|a| self.delay_for(a)).collect()
    }

    /// Total worst-case wait before giving up
    pub fn worst_case_wait(&self) -> Duration {
        self.delays().into_iter().sum()
    }

    /// Drive `attempt` until it succeeds, fails fatally, or attempts run out
    ///
    /// Transport errors (connection refused, body read failures) are returned
    /// as-is without retry.
    pub async fn run<F, Fut>(&self, endpoint: &str, mut attempt: F) -> Result<RawResponse>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<RawResponse>>,
    {
        let mut last_status = 0;

        for n in 0..self.max_attempts {
            let response = attempt(n).await?;
            match response.outcome() {
                Outcome::Success => return Ok(response),
                Outcome::Fatal(status) => {
                    return Err(Error::http_status(status, endpoint, response.body));
                }
                Outcome::RateLimited | Outcome::UpstreamTimeout => {
                    last_status = response.status;
                    let delay = self.delay_for(n);
                    warn!(
                        "{} from {endpoint}, attempt {}/{}, waiting {:?}",
                        response.status,
                        n + 1,
                        self.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(Error::RetriesExhausted {
            endpoint: endpoint.to_string(),
            status: last_status,
            attempts: self.max_attempts,
        })
    }
}
