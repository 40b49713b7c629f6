// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Engage Harvest
//!
//! Rate-limit-aware concurrent harvesting of a paginated CRM REST API.
//!
//! ## Features
//!
//! - **Backoff**: every call retries 429 and 504 with exponential sleeps
//! - **Fan-out**: a fixed pool of workers pulls page offsets from one queue
//! - **Fan-in**: a completion barrier closes the output queue exactly once
//! - **Quota governor**: mutating batches wait for server-reported budget
//! - **Pluggable guides**: per-entity fetch, filter and transform
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engage_harvest::engage::{CollectionConfig, CollectionGuide};
//! use engage_harvest::http::{HttpClient, HttpClientConfig};
//! use engage_harvest::pipeline::{Pipeline, PipelineConfig, VecSink};
//!
//! #[tokio::main]
//! async fn main() -> engage_harvest::Result<()> {
//!     let client = HttpClient::new(
//!         HttpClientConfig::builder()
//!             .base_url("https://api.example.org")
//!             .token("...")
//!             .build(),
//!     )?;
//!     let guide = CollectionGuide::new(client, CollectionConfig::new("/api/supporters/search"));
//!
//!     let mut sink = VecSink::new();
//!     let report = Pipeline::new(guide, PipelineConfig::default())
//!         .run(&mut sink)
//!         .await?;
//!     println!("{} of {} records", report.records_delivered, report.total_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   probe (count=0) ──► total
//!                         │
//!   ┌─────────────────┐   │   bounded    ┌──────────┐
//!   │ Offset Generator├───┴──────────────► Worker 1 ├──┐
//!   └─────────────────┘    offset queue  │ Worker 2 ├──┤ output queue ┌──────┐
//!                                        │ Worker N ├──┼──────────────► Sink │
//!                                        └────┬─────┘  │              └───┬──┘
//!                                             │ termination signals       │
//!                                        ┌────▼──────────────┐            │
//!                                        │ Completion Barrier├── closes ──┘
//!                                        └───────────────────┘
//!
//!   every fetch and mutation ──► HttpClient ──► Backoff ──► Transport
//!   mutating batches ──► Rate Governor ──► metrics endpoint
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// HTTP transport, outcome classification and backoff
pub mod http;

/// Offset generation and the page source contract
pub mod pagination;

/// Worker pool, completion barrier and sinks
pub mod pipeline;

/// Quota state and the rate governor
pub mod quota;

/// Governed batch mutations
pub mod mutation;

/// Engage endpoint adapters
pub mod engage;

/// Run configuration
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::{load_config, load_config_from_str, RunConfig};
pub use pipeline::{Guide, Pipeline, PipelineConfig, RunReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
