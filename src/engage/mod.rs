//! Engage API collaborators
//!
//! Concrete adapters that plug the vendor's JSON endpoints into the generic
//! pipeline: a paginated search collection, the quota metrics endpoint and
//! the bulk delete endpoint. Field semantics stay opaque; only the envelope
//! shape is known here.

mod collection;
mod delete;
mod metrics;
mod types;

pub use collection::CollectionGuide;
pub use delete::{item_code, DeleteMutator};
pub use metrics::{MetricsSource, DEFAULT_METRICS_ENDPOINT};
pub use types::{field_at, CollectionConfig, JsonRecord, RecordFilterConfig};
