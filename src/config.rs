//! Run configuration
//!
//! One YAML file describes the API credentials, retry and pacing policy,
//! pipeline sizing, quota handling and the collection a run targets.
//!
//! ```yaml
//! api:
//!   host: "https://api.example.org"
//!   token_env: ENGAGE_TOKEN
//! pipeline:
//!   workers: 3
//!   page_size: 20
//! collection:
//!   endpoint: /api/integration/ext/v1/supporters/search
//! mutation:
//!   endpoint: /api/integration/ext/v1/supporters
//! ```

use crate::engage::{CollectionConfig, RecordFilterConfig, DEFAULT_METRICS_ENDPOINT};
use crate::error::{Error, Result};
use crate::http::{BackoffPolicy, HttpClientConfig, RateLimiterConfig, DEFAULT_AUTH_HEADER};
use crate::pipeline::PipelineConfig;
use crate::quota::{GovernorConfig, WindowAnchor};
use crate::types::OptionStringExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-Level Run Config
// ============================================================================

/// Complete run configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// API host and credentials
    pub api: ApiConfig,

    /// Retry policy for 429/504 responses
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Pipeline sizing
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Quota governor settings
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Collection to harvest
    pub collection: CollectionConfig,

    /// Optional client-side record filter
    #[serde(default)]
    pub filter: Option<RecordFilterConfig>,

    /// Search criteria merged into every page request
    #[serde(default)]
    pub criteria: Value,

    /// Mutating endpoint for `delete`
    #[serde(default)]
    pub mutation: Option<MutationConfig>,

    /// Quota metrics endpoint
    #[serde(default = "default_metrics_endpoint")]
    pub metrics_endpoint: String,
}

fn default_metrics_endpoint() -> String {
    DEFAULT_METRICS_ENDPOINT.to_string()
}

// ============================================================================
// Sections
// ============================================================================

/// API host and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.example.org`
    pub host: String,

    /// Inline token
    #[serde(default)]
    pub token: Option<String>,

    /// Environment variable holding the token
    #[serde(default)]
    pub token_env: Option<String>,

    /// Header carrying the token
    #[serde(default = "default_auth_header")]
    pub auth_header: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Client-side pacing; off when unset
    #[serde(default)]
    pub requests_per_minute: Option<u32>,

    /// Log request and response bodies at trace level
    #[serde(default)]
    pub log_bodies: bool,
}

fn default_auth_header() -> String {
    DEFAULT_AUTH_HEADER.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Delay growth factor
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound on a single delay, in milliseconds
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: None,
        }
    }
}

/// Pipeline sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Records per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Resume offset
    #[serde(default)]
    pub start_offset: u64,

    /// Output queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Skip pages whose retries were exhausted
    #[serde(default)]
    pub skip_failed_pages: bool,
}

fn default_workers() -> usize {
    3
}

fn default_page_size() -> u32 {
    20
}

fn default_queue_capacity() -> usize {
    1000
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            page_size: default_page_size(),
            start_offset: 0,
            queue_capacity: default_queue_capacity(),
            skip_failed_pages: false,
        }
    }
}

/// Quota governor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Fraction of the window after which no batch starts
    #[serde(default = "default_early_throttle_ratio")]
    pub early_throttle_ratio: f64,

    /// Window alignment
    #[serde(default)]
    pub anchor: WindowAnchor,
}

fn default_window_secs() -> u64 {
    60
}

fn default_early_throttle_ratio() -> f64 {
    0.99
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            early_throttle_ratio: default_early_throttle_ratio(),
            anchor: WindowAnchor::default(),
        }
    }
}

/// Mutating endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Endpoint path
    pub endpoint: String,

    /// Records per mutating call
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_batch_size() -> u32 {
    20
}

// ============================================================================
// Loading
// ============================================================================

/// Load and validate a run configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<RunConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read config file '{}': {e}", path.display()))
    })?;
    load_config_from_str(&content)
}

/// Load and validate a run configuration from a YAML string
pub fn load_config_from_str(yaml: &str) -> Result<RunConfig> {
    let config: RunConfig = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse config YAML: {e}")))?;

    config.validate()?;
    Ok(config)
}

impl RunConfig {
    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.api.host.is_empty() {
            return Err(Error::missing_field("api.host"));
        }
        if self.collection.endpoint.is_empty() {
            return Err(Error::missing_field("collection.endpoint"));
        }
        if self.pipeline.workers == 0 {
            return Err(Error::invalid_value("pipeline.workers", "must be at least 1"));
        }
        if self.pipeline.page_size == 0 {
            return Err(Error::invalid_value("pipeline.page_size", "must be at least 1"));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(Error::invalid_value(
                "pipeline.queue_capacity",
                "must be at least 1",
            ));
        }
        if self.backoff.max_attempts == 0 {
            return Err(Error::invalid_value("backoff.max_attempts", "must be at least 1"));
        }
        if self.quota.window_secs == 0 {
            return Err(Error::invalid_value("quota.window_secs", "must be greater than zero"));
        }
        let ratio = self.quota.early_throttle_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(Error::invalid_value(
                "quota.early_throttle_ratio",
                "must be in (0, 1]",
            ));
        }
        if let Some(mutation) = &self.mutation {
            if mutation.endpoint.is_empty() {
                return Err(Error::missing_field("mutation.endpoint"));
            }
        }

        self.resolve_token()?;
        Ok(())
    }

    /// API token from `api.token`, or from the variable named by `api.token_env`
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(token) = self.api.token.clone().none_if_empty() {
            return Ok(token);
        }

        match &self.api.token_env {
            Some(var) => match std::env::var(var).ok().none_if_empty() {
                Some(token) => Ok(token),
                None => Err(Error::config(format!(
                    "Environment variable '{var}' named by api.token_env is not set"
                ))),
            },
            None => Err(Error::missing_field("api.token")),
        }
    }

    /// Backoff policy
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let policy = BackoffPolicy::new(
            self.backoff.max_attempts,
            Duration::from_millis(self.backoff.initial_delay_ms),
            self.backoff.multiplier,
        );
        match self.backoff.max_delay_ms {
            Some(ms) => policy.with_max_delay(Duration::from_millis(ms)),
            None => policy,
        }
    }

    /// HTTP client configuration with the resolved token
    pub fn http_client_config(&self) -> Result<HttpClientConfig> {
        let mut builder = HttpClientConfig::builder()
            .base_url(&self.api.host)
            .token(self.resolve_token()?)
            .auth_header(&self.api.auth_header)
            .timeout(Duration::from_secs(self.api.timeout_secs))
            .backoff(self.backoff_policy())
            .log_bodies(self.api.log_bodies);

        builder = match self.api.requests_per_minute {
            Some(rpm) => builder.rate_limit(RateLimiterConfig::per_minute(rpm)),
            None => builder.no_rate_limit(),
        };
        Ok(builder.build())
    }

    /// Pipeline configuration
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_workers(self.pipeline.workers)
            .with_page_size(self.pipeline.page_size)
            .with_start_offset(self.pipeline.start_offset)
            .with_queue_capacity(self.pipeline.queue_capacity)
            .with_criteria(self.criteria.clone())
            .with_skip_failed_pages(self.pipeline.skip_failed_pages)
    }

    /// Governor configuration
    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig::new()
            .with_window(Duration::from_secs(self.quota.window_secs))
            .with_early_throttle_ratio(self.quota.early_throttle_ratio)
            .with_anchor(self.quota.anchor)
    }
}
