//! Symbol batching for subscription requests
//!
//! Venues cap how many symbols one subscription may carry. The universe is
//! cut into contiguous slices in its original order.

use std::num::NonZeroUsize;
use std::slice::Chunks;

/// Maximum symbols per subscription request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSize(Option<NonZeroUsize>);

impl BatchSize {
    pub const UNBOUNDED: BatchSize = BatchSize(None);

    /// Zero is treated as unbounded
    pub fn new(size: usize) -> Self {
        Self(NonZeroUsize::new(size))
    }

    pub fn from_option(size: Option<usize>) -> Self {
        size.map(Self::new).unwrap_or_default()
    }

    pub fn limit(&self) -> Option<usize> {
        self.0.map(NonZeroUsize::get)
    }

    fn chunk_len(&self) -> usize {
        self.limit().unwrap_or(usize::MAX)
    }
}

/// Split `symbols` into batches of at most `size`, flushing a final partial batch.
/// An empty universe yields no batches.
pub fn batches(symbols: &[String], size: BatchSize) -> Chunks<'_, String> {
    symbols.chunks(size.chunk_len())
}
