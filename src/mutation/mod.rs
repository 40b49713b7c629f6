//! Mutation module
//!
//! Governed batch mutations (bulk delete, upsert) fed by a harvest.

mod sink;
mod types;

pub use sink::MutationSink;
pub use types::{Identified, ItemCode, ItemResult, MutationReport, Mutator};
