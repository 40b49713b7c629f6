//! Rate governor for mutating calls
//!
//! Before each batch the governor polls the metrics endpoint. It waits for
//! the next window whenever the remaining budget cannot cover the batch, or
//! when the current window is almost over so a batch never straddles a reset.
//! A 429 that slips through anyway is the backoff policy's business.

use super::types::{
    GovernorConfig, GovernorState, QuotaMetrics, QuotaPermit, QuotaState, WindowAnchor,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the governor reads the live quota from
#[async_trait]
pub trait QuotaSource: Send + Sync {
    /// Poll the current quota
    async fn fetch_quota(&self) -> Result<QuotaMetrics>;
}

struct Inner {
    quota: Option<QuotaState>,
    window_started_at: Option<Instant>,
    waits: u32,
}

/// Single writer of `QuotaState`, shared by cloning
#[derive(Clone)]
pub struct RateGovernor {
    source: Arc<dyn QuotaSource>,
    config: GovernorConfig,
    inner: Arc<Mutex<Inner>>,
    state: Arc<watch::Sender<GovernorState>>,
    cancel: CancellationToken,
}

impl RateGovernor {
    /// Create a governor over a quota source
    pub fn new(source: Arc<dyn QuotaSource>, config: GovernorConfig) -> Result<Self> {
        if config.window.is_zero() {
            return Err(Error::invalid_value("quota.window_secs", "must be greater than zero"));
        }
        if !(config.early_throttle_ratio > 0.0 && config.early_throttle_ratio <= 1.0) {
            return Err(Error::invalid_value(
                "quota.early_throttle_ratio",
                "must be in (0, 1]",
            ));
        }

        let (state, _) = watch::channel(GovernorState::Ready);
        Ok(Self {
            source,
            config,
            inner: Arc::new(Mutex::new(Inner {
                quota: None,
                window_started_at: None,
                waits: 0,
            })),
            state: Arc::new(state),
            cancel: CancellationToken::new(),
        })
    }

    /// Abort quota waits once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Current state
    pub fn state(&self) -> GovernorState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<GovernorState> {
        self.state.subscribe()
    }

    /// Last known quota, if any refresh happened yet
    pub async fn snapshot(&self) -> Option<QuotaState> {
        self.inner.lock().await.quota.clone()
    }

    /// Window waits performed so far
    pub async fn waits(&self) -> u32 {
        self.inner.lock().await.waits
    }

    /// Largest batch the server accepts, as last reported
    pub async fn max_batch_size(&self) -> Option<u32> {
        self.inner
            .lock()
            .await
            .quota
            .as_ref()
            .and_then(|q| q.max_batch_size)
    }

    /// Poll the quota source and return the fresh state
    pub async fn refresh(&self) -> Result<QuotaState> {
        let mut inner = self.inner.lock().await;
        self.refresh_locked(&mut inner).await
    }

    /// Record that a mutating call was rejected with 429 anyway
    pub fn mark_throttled(&self) {
        warn!("Mutating call rate limited despite quota check");
        self.state.send_replace(GovernorState::Throttled);
    }

    /// Reserve budget for a batch of `batch` requests
    ///
    /// Empty batches return `None` without touching the quota. A cancelled
    /// token ends the wait with [`Error::Cancelled`] and grants nothing.
    pub async fn acquire(&self, batch: u32) -> Result<Option<QuotaPermit>> {
        if batch == 0 {
            return Ok(None);
        }

        let mut inner = self.inner.lock().await;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let quota = self.refresh_locked(&mut inner).await?;

            if batch > quota.request_limit_per_window {
                return Err(Error::BatchExceedsQuota {
                    batch,
                    limit: quota.request_limit_per_window,
                });
            }

            let elapsed = quota.elapsed_in_window();
            let late = elapsed.as_secs_f64()
                > self.config.window.as_secs_f64() * self.config.early_throttle_ratio;

            if quota.requests_remaining_this_window >= batch && !late {
                let quota = inner.quota.as_mut().ok_or_else(|| {
                    Error::Other("quota state missing after refresh".to_string())
                })?;
                quota.deduct(batch);
                let permit = QuotaPermit {
                    batch,
                    remaining_after: quota.requests_remaining_this_window,
                };
                self.state.send_replace(GovernorState::Ready);
                debug!(
                    "Quota permit for {batch}, {} left in window",
                    permit.remaining_after
                );
                return Ok(Some(permit));
            }

            let wait = self.config.window.saturating_sub(elapsed);
            info!(
                "Quota: {} of {} left, batch of {batch}, {:.1}s into window; waiting {:?}",
                quota.requests_remaining_this_window,
                quota.request_limit_per_window,
                elapsed.as_secs_f64(),
                wait
            );
            self.state.send_replace(GovernorState::Waiting);
            inner.waits += 1;
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.state.send_replace(GovernorState::Ready);
                    return Err(Error::Cancelled);
                }
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn refresh_locked(&self, inner: &mut Inner) -> Result<QuotaState> {
        let metrics = self.source.fetch_quota().await?;
        let window_started_at = self.window_start(inner);
        let state = QuotaState::from_metrics(&metrics, window_started_at);
        if self.state() == GovernorState::Throttled {
            self.state.send_replace(GovernorState::Ready);
        }
        inner.quota = Some(state.clone());
        Ok(state)
    }

    /// Start of the window containing now
    fn window_start(&self, inner: &mut Inner) -> Instant {
        let now = Instant::now();
        let window = self.config.window;

        let start = match self.config.anchor {
            WindowAnchor::FirstRefresh => {
                let mut start = *inner.window_started_at.get_or_insert(now);
                while now.duration_since(start) >= window {
                    start += window;
                }
                start
            }
            WindowAnchor::WallClock => {
                let window_ms = window.as_millis().max(1) as i64;
                let into = Utc::now().timestamp_millis().rem_euclid(window_ms);
                now.checked_sub(Duration::from_millis(into as u64))
                    .unwrap_or(now)
            }
        };

        inner.window_started_at = Some(start);
        start
    }
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
