//! CLI module
//!
//! Command-line interface for harvesting runs.
//!
//! # Commands
//!
//! - `count` - Probe the collection total
//! - `harvest` - Stream every record to a JSON lines file
//! - `delete` - Bulk delete harvested records under the quota governor
//! - `quota` - Show the current request quota
//! - `validate` - Check the run configuration

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
