//! Per-tick extraction of records that arrived since the previous tick
//!
//! Anchors are compared by reference identity (`Arc::ptr_eq`), never by
//! field values: a venue may overwrite a cache slot with a new object that
//! carries equal fields, and that must count as new data.

pub mod quotes;
pub mod trades;

use std::sync::Arc;

use serde::Serialize;

use crate::cache::FeedCaches;

pub use quotes::QuoteDiffExtractor;
pub use trades::TradeDiffExtractor;

pub trait DiffExtractor: Send + 'static {
    type Record: Serialize + Send + Sync + 'static;

    /// Scan `symbols` in order and return the new records, oldest first per symbol
    fn extract(&mut self, symbols: &[String], caches: &FeedCaches) -> Vec<Arc<Self::Record>>;
}
