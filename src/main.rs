// Allow common clippy pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! Engage Harvest CLI
//!
//! Harvest, count and bulk-delete records of one collection

use anyhow::Context;
use clap::Parser;
use engage_harvest::cli::{Cli, Runner};
use engage_harvest::{Error, LogLevel};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Records may go to stdout, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::from(level).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let runner = Runner::new(cli);
    runner.register_signal_handlers();

    match run(&runner).await {
        Ok(()) => {}
        Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::Cancelled)) => {
            eprintln!("Cancelled");
            std::process::exit(130);
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(runner: &Runner) -> anyhow::Result<()> {
    let config = runner.config_path().display().to_string();
    runner
        .run()
        .await
        .with_context(|| format!("Run with config '{config}' failed"))
}
