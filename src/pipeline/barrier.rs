//! Completion barrier
//!
//! The barrier owns the master sender of the output queue. Every worker gets
//! an [`OutputHandle`] holding a sender clone; dropping the handle releases
//! the clone *and then* emits one [`WorkerTermination`]. Once the barrier has
//! counted the expected signals it drops the master sender. The queue closes
//! when the last sender is gone, so it closes exactly once and only after
//! every worker's final send, whatever order the workers finish in.

use super::types::WorkerTermination;
use crate::error::{Error, Result};
use tokio::sync::mpsc;
use tracing::debug;

/// A worker's sending end of the output queue
pub struct OutputHandle<T> {
    worker: usize,
    tx: Option<mpsc::Sender<T>>,
    done: mpsc::UnboundedSender<WorkerTermination>,
}

impl<T> OutputHandle<T> {
    /// Worker this handle belongs to
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Send one record, waiting for capacity
    pub async fn send(&self, record: T) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::QueueClosed)?;
        tx.send(record).await.map_err(|_| Error::QueueClosed)
    }

    /// Stop sending and signal termination
    pub fn finish(self) {}
}

impl<T> Drop for OutputHandle<T> {
    fn drop(&mut self) {
        // sender first, so the signal proves this worker can no longer send
        drop(self.tx.take());
        let _ = self.done.send(WorkerTermination);
        debug!("Worker {} terminated", self.worker);
    }
}

impl<T> std::fmt::Debug for OutputHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHandle")
            .field("worker", &self.worker)
            .field("open", &self.tx.is_some())
            .finish()
    }
}

/// Fan-in barrier that closes the output queue once
pub struct CompletionBarrier<T> {
    tx: mpsc::Sender<T>,
    signal_tx: mpsc::UnboundedSender<WorkerTermination>,
    signals: mpsc::UnboundedReceiver<WorkerTermination>,
    issued: usize,
}

impl<T> CompletionBarrier<T> {
    /// Create a barrier and the receiving end of a bounded output queue
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (signal_tx, signals) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                signal_tx,
                signals,
                issued: 0,
            },
            rx,
        )
    }

    /// Issue a handle for the next worker
    pub fn handle(&mut self) -> OutputHandle<T> {
        let worker = self.issued;
        self.issued += 1;
        OutputHandle {
            worker,
            tx: Some(self.tx.clone()),
            done: self.signal_tx.clone(),
        }
    }

    /// Handles issued so far
    pub fn issued(&self) -> usize {
        self.issued
    }

    /// Wait for `expected` termination signals, then close the queue
    ///
    /// If every handle is gone before `expected` signals arrive the wait
    /// ends early instead of hanging. Returns the signals counted.
    pub async fn await_all(self, expected: usize) -> usize {
        let Self {
            tx,
            signal_tx,
            mut signals,
            ..
        } = self;
        drop(signal_tx);

        let mut remaining = expected;
        while remaining > 0 {
            if signals.recv().await.is_none() {
                break;
            }
            remaining -= 1;
        }

        drop(tx);
        let counted = expected - remaining;
        debug!("Barrier released after {counted}/{expected} termination signals");
        counted
    }
}

impl<T> std::fmt::Debug for CompletionBarrier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionBarrier")
            .field("issued", &self.issued)
            .finish_non_exhaustive()
    }
}
