//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{load_config, RunConfig};
use crate::engage::{CollectionGuide, DeleteMutator, MetricsSource};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::mutation::{MutationReport, MutationSink};
use crate::pipeline::{JsonLinesSink, Pipeline, RunReport};
use crate::quota::{QuotaSource, RateGovernor};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
    cancel: CancellationToken,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            cancel: CancellationToken::new(),
        }
    }

    /// Path of the run configuration
    pub fn config_path(&self) -> &std::path::Path {
        &self.cli.config
    }

    /// Token that cancels whatever command is running
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel on SIGINT or SIGTERM
    pub fn register_signal_handlers(&self) {
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {e}");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to listen for SIGTERM: {e}");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                () = ctrl_c => info!("Received Ctrl+C, cancelling run"),
                () = terminate => info!("Received SIGTERM, cancelling run"),
            }
            cancel.cancel();
        });
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Validate => self.validate(),
            Commands::Count => self.count().await,
            Commands::Quota => self.quota().await,
            Commands::Harvest {
                output,
                offset,
                workers,
                page_size,
                skip_failed_pages,
            } => {
                let mut config = self.load_config()?;
                config.pipeline.start_offset = offset.unwrap_or(config.pipeline.start_offset);
                config.pipeline.workers = workers.unwrap_or(config.pipeline.workers);
                config.pipeline.page_size = page_size.unwrap_or(config.pipeline.page_size);
                config.pipeline.skip_failed_pages |= *skip_failed_pages;
                self.harvest(&config, output.clone()).await
            }
            Commands::Delete {
                dry_run,
                offset,
                workers,
            } => {
                let mut config = self.load_config()?;
                config.pipeline.start_offset = offset.unwrap_or(config.pipeline.start_offset);
                config.pipeline.workers = workers.unwrap_or(config.pipeline.workers);
                self.delete(&config, *dry_run).await
            }
        }
    }

    /// Load the run configuration
    fn load_config(&self) -> Result<RunConfig> {
        load_config(&self.cli.config)
    }

    fn client(config: &RunConfig) -> Result<HttpClient> {
        HttpClient::new(config.http_client_config()?)
    }

    fn pipeline(&self, config: &RunConfig, client: HttpClient) -> Pipeline<CollectionGuide> {
        let guide = CollectionGuide::new(client, config.collection.clone())
            .with_filter(config.filter.clone());
        Pipeline::new(guide, config.pipeline_config()).with_cancellation(self.cancel.clone())
    }

    /// Validate the run configuration
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Config '{}' is valid: {} workers, page size {}, collection {}",
                    self.cli.config.display(),
                    config.pipeline.workers,
                    config.pipeline.page_size,
                    config.collection.endpoint
                )
            }
        }));

        Ok(())
    }

    /// Print the collection total
    async fn count(&self) -> Result<()> {
        let config = self.load_config()?;
        let pipeline = self.pipeline(&config, Self::client(&config)?);
        let total = pipeline.count().await?;

        self.output_message(&json!({
            "type": "COUNT",
            "endpoint": config.collection.endpoint,
            "total": total
        }));
        Ok(())
    }

    /// Print the current quota
    async fn quota(&self) -> Result<()> {
        let config = self.load_config()?;
        let source = MetricsSource::new(Self::client(&config)?, &config.metrics_endpoint);
        let metrics = source.fetch_quota().await?;

        self.output_message(&json!({
            "type": "QUOTA",
            "quota": metrics
        }));
        Ok(())
    }

    /// Harvest into a JSON lines file, or stdout
    async fn harvest(&self, config: &RunConfig, output: Option<PathBuf>) -> Result<()> {
        let pipeline = self.pipeline(config, Self::client(config)?);

        let report = match &output {
            Some(path) => {
                let mut sink = JsonLinesSink::create(path)?;
                let report = pipeline.run(&mut sink).await?;
                info!("Wrote {} records to {}", sink.written(), path.display());
                report
            }
            None => {
                let mut sink = JsonLinesSink::new(std::io::stdout());
                pipeline.run(&mut sink).await?
            }
        };

        let message = json!({ "type": "HARVEST", "report": run_report_json(&report) });
        match output {
            Some(_) => self.output_message(&message),
            None => info!("{message}"),
        }
        Ok(())
    }

    /// Harvest every matching record, then delete them through the governed sink
    async fn delete(&self, config: &RunConfig, dry_run: bool) -> Result<()> {
        let mutation = config
            .mutation
            .as_ref()
            .ok_or_else(|| Error::missing_field("mutation"))?;

        let client = Self::client(config)?;
        let source = Arc::new(MetricsSource::new(client.clone(), &config.metrics_endpoint));
        let governor = RateGovernor::new(source, config.governor_config())?
            .with_cancellation(self.cancel.clone());
        let mutator = DeleteMutator::new(client.clone(), &mutation.endpoint, &config.collection);
        let mut sink = MutationSink::new(mutator, governor.clone(), mutation.batch_size)
            .dry_run(dry_run)
            .with_cancellation(self.cancel.clone());

        let pipeline = self.pipeline(config, client);
        let report = pipeline.run(&mut sink).await?;
        let mutation_report = sink.into_report();
        let remaining = pipeline.count().await?;

        self.output_message(&json!({
            "type": "DELETE",
            "dry_run": dry_run,
            "harvest": run_report_json(&report),
            "mutation": mutation_report_json(&mutation_report),
            "quota_waits": governor.waits().await,
            "remaining_total": remaining
        }));

        if !mutation_report.is_clean() {
            return Err(Error::sink(format!(
                "{} deletions failed, {} unreported",
                mutation_report.failed.len(),
                mutation_report.unreported
            )));
        }
        // unfiltered from offset zero, every matching record was a target
        let full_sweep = config.filter.is_none() && config.pipeline.start_offset == 0;
        if !dry_run && full_sweep && remaining > 0 {
            return Err(Error::sink(format!(
                "{remaining} records still in {} after delete",
                config.collection.endpoint
            )));
        }
        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn run_report_json(report: &RunReport) -> Value {
    json!({
        "total_count": report.total_count,
        "offsets_planned": report.offsets_planned,
        "offsets_fed": report.offsets_fed,
        "pages_fetched": report.pages_fetched,
        "records_seen": report.records_seen,
        "records_delivered": report.records_delivered,
        "workers_terminated": report.workers_terminated,
        "skipped_offsets": report.skipped_offsets,
        "duration_ms": report.duration.as_millis() as u64
    })
}

fn mutation_report_json(report: &MutationReport) -> Value {
    json!({
        "applied": report.applied,
        "not_found": report.not_found,
        "failed": report.failed,
        "unreported": report.unreported,
        "duplicates": report.duplicates,
        "batches": report.batches,
        "dry_run_items": report.dry_run_items
    })
}
