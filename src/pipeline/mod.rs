//! Harvesting pipeline module
//!
//! Fan-out over offsets, fan-in through a completion barrier.
//!
//! # Overview
//!
//! - `Guide` - per-entity fetch, filter and transform
//! - `Pipeline` - probe, feed offsets, run workers, drain into a sink
//! - `CompletionBarrier` - closes the output queue exactly once
//! - `RecordSink` - the consumer of pipeline output
//!
//! There is no ordering across workers. Within one page, records reach the
//! output queue in server order.

mod barrier;
mod runner;
mod sink;
mod types;
mod worker;

pub use barrier::{CompletionBarrier, OutputHandle};
pub use runner::Pipeline;
pub use sink::{CountBySink, JsonLinesSink, RecordSink, VecSink};
pub use types::{
    Guide, Passthrough, PipelineConfig, RunReport, WorkerSummary, WorkerTermination,
};

#[cfg(test)]
mod tests;
