//! Worker loop
//!
//! Pull an offset, fetch the page, filter and transform in server order,
//! forward to the output queue. Every suspension point races the run's
//! cancellation token.

use super::barrier::OutputHandle;
use super::types::{Guide, WorkerSummary};
use crate::error::{Error, Result};
use crate::pagination::PageRequest;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Shared offset queue; each request is received by exactly one worker
pub(crate) type OffsetQueue = Arc<Mutex<mpsc::Receiver<PageRequest>>>;

pub(crate) struct Worker<G: Guide> {
    pub(crate) guide: Arc<G>,
    pub(crate) offsets: OffsetQueue,
    pub(crate) output: OutputHandle<G::Output>,
    pub(crate) cancel: CancellationToken,
    /// Lowest offset known to be past the end of the collection
    pub(crate) end_of_data: Arc<AtomicU64>,
    pub(crate) skip_failed_pages: bool,
}

impl<G: Guide> Worker<G> {
    pub(crate) async fn run(self) -> Result<WorkerSummary> {
        let id = self.output.worker();
        let result = self.run_inner().await;

        if let Err(e) = &result {
            if !matches!(e, Error::Cancelled) {
                error!("Worker {id} failed: {e}");
                self.cancel.cancel();
            }
        }

        // dropping self releases the output handle and signals termination
        result
    }

    async fn run_inner(&self) -> Result<WorkerSummary> {
        let id = self.output.worker();
        let mut summary = WorkerSummary::default();

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Error::Cancelled),
                next = async { self.offsets.lock().await.recv().await } => next,
            };
            let Some(request) = next else {
                break;
            };

            if request.offset >= self.end_of_data.load(Ordering::Acquire) {
                debug!("Worker {id} skipping offset {} past end of data", request.offset);
                continue;
            }

            let fetched = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Error::Cancelled),
                page = self.guide.fetch_page(&request) => page,
            };

            let page = match fetched {
                Ok(page) => page,
                Err(e) if self.skip_failed_pages && e.is_retries_exhausted() => {
                    warn!("Worker {id} skipping offset {}: {e}", request.offset);
                    summary.skipped_offsets.push(request.offset);
                    continue;
                }
                Err(e) => return Err(e),
            };

            summary.pages_fetched += 1;
            debug!(
                "Worker {id} fetched {} records at offset {}",
                page.returned_count, request.offset
            );

            if page.is_empty() {
                self.end_of_data.fetch_min(request.offset, Ordering::AcqRel);
                continue;
            }

            summary.records_seen += page.returned_count;
            for record in page.records {
                if !self.guide.filter(&record) {
                    continue;
                }
                let output = self.guide.transform(record);
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Err(Error::Cancelled),
                    sent = self.output.send(output) => sent?,
                }
                summary.records_delivered += 1;
            }
        }

        debug!("Worker {id} drained the offset queue");
        Ok(summary)
    }
}
