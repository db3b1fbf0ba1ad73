// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregator;
pub mod api;
pub mod ingest;
pub mod metrics;
pub mod store;

pub use crate::aggregator::{AggregationOutcome, Aggregator};
pub use crate::api::router;
pub use crate::store::{InMemoryStore, Store};
