//! HTTP module
//!
//! The single path through which every read and mutating call passes.
//!
//! # Layers
//!
//! - **Transport**: one raw request/response cycle, auth header attached
//! - **Outcome**: classification of a status into success, retriable or fatal
//! - **Backoff Policy**: exponential sleep-and-retry on 429 and 504
//! - **Rate Limiting**: optional client-side token bucket using governor

mod backoff;
mod client;
mod rate_limit;
mod transport;

pub use backoff::BackoffPolicy;
pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, DEFAULT_AUTH_HEADER};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use transport::{Outcome, RawResponse, ReqwestTransport, Transport};

#[cfg(test)]
mod tests;
