//! Pipeline orchestration
//!
//! probe → offset feeder → N workers → completion barrier → sink

use super::barrier::CompletionBarrier;
use super::sink::RecordSink;
use super::types::{Guide, PipelineConfig, RunReport};
use super::worker::Worker;
use crate::error::{Error, Result};
use crate::pagination::{probe_total, OffsetGenerator};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Concurrent harvesting pipeline over one remote collection
pub struct Pipeline<G: Guide> {
    guide: Arc<G>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<G: Guide> Pipeline<G> {
    /// Create a pipeline
    pub fn new(guide: G, config: PipelineConfig) -> Self {
        Self::from_arc(Arc::new(guide), config)
    }

    /// Create a pipeline sharing an existing guide
    pub fn from_arc(guide: Arc<G>, config: PipelineConfig) -> Self {
        Self {
            guide,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel runs from outside through `token`
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels every run of this pipeline
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read the collection total without harvesting
    pub async fn count(&self) -> Result<u64> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            total = probe_total(self.guide.as_ref(), &self.config.criteria) => total,
        }
    }

    /// Harvest the whole collection into `sink`
    ///
    /// The first fatal worker error cancels the other workers and is
    /// returned; records the sink already consumed are not rolled back.
    pub async fn run<S>(&self, sink: &mut S) -> Result<RunReport>
    where
        S: RecordSink<G::Output>,
    {
        self.config.validate()?;
        let started = Instant::now();
        let run_cancel = self.cancel.child_token();

        let total_count = self.count().await?;
        let generator =
            OffsetGenerator::new(total_count, self.config.page_size, self.config.start_offset)?;
        let offsets_planned = generator.len();

        info!(
            "Harvesting {total_count} records from offset {}: {offsets_planned} pages of {}, {} workers",
            self.config.start_offset, self.config.page_size, self.config.workers
        );

        let (offset_tx, offset_rx) = mpsc::channel(self.config.offset_capacity);
        let feeder = tokio::spawn(generator.feed(
            offset_tx,
            self.config.criteria.clone(),
            run_cancel.clone(),
        ));

        let (mut barrier, mut output) = CompletionBarrier::new(self.config.queue_capacity);
        let offsets = Arc::new(Mutex::new(offset_rx));
        let end_of_data = Arc::new(AtomicU64::new(u64::MAX));

        let workers: Vec<JoinHandle<_>> = (0..self.config.workers)
            .map(|_| {
                let worker = Worker {
                    guide: Arc::clone(&self.guide),
                    offsets: Arc::clone(&offsets),
                    output: barrier.handle(),
                    cancel: run_cancel.clone(),
                    end_of_data: Arc::clone(&end_of_data),
                    skip_failed_pages: self.config.skip_failed_pages,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let expected = barrier.issued();
        let barrier = tokio::spawn(barrier.await_all(expected));

        let mut sink_error = None;
        loop {
            tokio::select! {
                biased;
                () = run_cancel.cancelled() => break,
                record = output.recv() => match record {
                    Some(record) => {
                        let consumed = tokio::select! {
                            biased;
                            () = run_cancel.cancelled() => break,
                            consumed = sink.consume(record) => consumed,
                        };
                        if let Err(e) = consumed {
                            error!("Sink failed: {e}");
                            sink_error = Some(e);
                            run_cancel.cancel();
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        let mut report = RunReport {
            total_count,
            offsets_planned,
            ..RunReport::default()
        };
        let mut failure = sink_error;

        for (id, handle) in workers.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(summary)) => report.absorb(summary),
                Ok(Err(Error::Cancelled | Error::QueueClosed)) => {}
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(join) => {
                    run_cancel.cancel();
                    failure.get_or_insert(Error::worker(id, format!("task failed: {join}")));
                }
            }
        }

        // every handle is gone once the workers are joined, so neither task can hang
        drop(output);
        report.offsets_fed = feeder.await.unwrap_or_default();
        report.workers_terminated = barrier.await.unwrap_or_default();
        report.skipped_offsets.sort_unstable();
        report.duration = started.elapsed();

        if let Some(e) = failure {
            return Err(e);
        }
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        sink.finish().await?;

        info!(
            "Harvest complete: {} of {} records delivered from {} pages in {:?}",
            report.records_delivered, report.records_seen, report.pages_fetched, report.duration
        );

        Ok(report)
    }
}

impl<G: Guide> std::fmt::Debug for Pipeline<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
