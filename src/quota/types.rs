//! Quota types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Quota snapshot as the metrics endpoint reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaMetrics {
    /// Requests allowed per window
    #[serde(rename = "rateLimit", alias = "requestLimitPerWindow")]
    pub request_limit_per_window: u32,
    /// Requests left in the current window
    #[serde(rename = "currentRateLimit", alias = "requestsRemainingThisWindow")]
    pub requests_remaining_this_window: u32,
    /// Largest batch a mutating call accepts
    #[serde(rename = "maxBatchSize", default, skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<u32>,
}

impl QuotaMetrics {
    /// Create a snapshot
    pub fn new(limit: u32, remaining: u32) -> Self {
        Self {
            request_limit_per_window: limit,
            requests_remaining_this_window: remaining,
            max_batch_size: None,
        }
    }

    /// Set the maximum batch size
    #[must_use]
    pub fn with_max_batch_size(mut self, size: u32) -> Self {
        self.max_batch_size = Some(size);
        self
    }
}

/// The governor's view of the quota
///
/// A best-effort hint refreshed from the metrics endpoint, never a guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaState {
    /// Requests left in the current window, after local deductions
    pub requests_remaining_this_window: u32,
    /// Requests allowed per window
    pub request_limit_per_window: u32,
    /// Largest batch a mutating call accepts
    pub max_batch_size: Option<u32>,
    /// When the current window opened
    pub window_started_at: Instant,
    /// Wall-clock time of the last refresh
    pub refreshed_at: DateTime<Utc>,
}

impl QuotaState {
    /// Build state from a fresh snapshot
    pub fn from_metrics(metrics: &QuotaMetrics, window_started_at: Instant) -> Self {
        Self {
            requests_remaining_this_window: metrics
                .requests_remaining_this_window
                .min(metrics.request_limit_per_window),
            request_limit_per_window: metrics.request_limit_per_window,
            max_batch_size: metrics.max_batch_size,
            window_started_at,
            refreshed_at: Utc::now(),
        }
    }

    /// Deduct a batch without going below zero
    pub fn deduct(&mut self, batch: u32) {
        self.requests_remaining_this_window =
            self.requests_remaining_this_window.saturating_sub(batch);
    }

    /// Time spent in the current window
    pub fn elapsed_in_window(&self) -> Duration {
        self.window_started_at.elapsed()
    }
}

/// Governor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorState {
    /// Budget available
    Ready,
    /// A mutating call hit 429 despite the governor's check
    Throttled,
    /// Sleeping until the next window opens
    Waiting,
}

/// How the governor locates quota window boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAnchor {
    /// Windows align to the wall clock (the top of every minute for 60s windows)
    #[default]
    WallClock,
    /// The first window opens at the first refresh
    FirstRefresh,
}

/// Configuration for the rate governor
#[derive(Debug, Clone, PartialEq)]
pub struct GovernorConfig {
    /// Quota window length
    pub window: Duration,
    /// Fraction of the window after which no new batch is started
    pub early_throttle_ratio: f64,
    /// Window alignment
    pub anchor: WindowAnchor,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            early_throttle_ratio: 0.99,
            anchor: WindowAnchor::WallClock,
        }
    }
}

impl GovernorConfig {
    /// Create a new governor config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set window length
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set early-throttle ratio
    #[must_use]
    pub fn with_early_throttle_ratio(mut self, ratio: f64) -> Self {
        self.early_throttle_ratio = ratio;
        self
    }

    /// Set window alignment
    #[must_use]
    pub fn with_anchor(mut self, anchor: WindowAnchor) -> Self {
        self.anchor = anchor;
        self
    }
}

/// Budget reserved for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPermit {
    /// Requests reserved
    pub batch: u32,
    /// Local estimate of what is left in the window
    pub remaining_after: u32,
}
