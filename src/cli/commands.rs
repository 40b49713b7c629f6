//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Concurrent harvesting and bulk mutation against the Engage API
#[derive(Parser, Debug)]
#[command(name = "engage-harvest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run configuration file (YAML)
    #[arg(short, long, global = true, default_value = "engage.yaml")]
    pub config: PathBuf,

    /// Report format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the collection total (one probe request)
    Count,

    /// Harvest the collection as JSON lines
    Harvest {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Resume from this offset
        #[arg(long)]
        offset: Option<u64>,

        /// Concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Records per page
        #[arg(long)]
        page_size: Option<u32>,

        /// Skip pages whose retries were exhausted instead of aborting
        #[arg(long)]
        skip_failed_pages: bool,
    },

    /// Delete every harvested record that passes the filter
    Delete {
        /// Count what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,

        /// Resume from this offset
        #[arg(long)]
        offset: Option<u64>,

        /// Concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show the current request quota
    Quota,

    /// Validate the run configuration
    Validate,
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
