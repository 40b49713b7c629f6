//! Quota module
//!
//! Server-reported request budget and the governor that obeys it for
//! mutating pipelines.
//!
//! # States
//!
//! - `Ready` - budget covers the next batch
//! - `Waiting` - sleeping until the next window opens
//! - `Throttled` - a 429 reached a mutating call anyway; cleared on refresh

mod governor;
mod types;

pub use governor::{QuotaSource, RateGovernor};
pub use types::{
    GovernorConfig, GovernorState, QuotaMetrics, QuotaPermit, QuotaState, WindowAnchor,
};
