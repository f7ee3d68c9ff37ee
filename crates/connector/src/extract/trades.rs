use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::FeedCaches;
use crate::extract::DiffExtractor;
use crate::record::Trade;

/// Emits the unseen tail of each symbol's trade cache.
///
/// The cache's new-count only resets on the next append, so a quiet symbol
/// keeps reporting the last count. The anchor holds the first trade of the
/// last emitted slice; seeing it again at the same position means nothing new.
#[derive(Debug, Default)]
pub struct TradeDiffExtractor {
    anchors: HashMap<String, Arc<Trade>>,
}

impl TradeDiffExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchor(&self, symbol: &str) -> Option<&Arc<Trade>> {
        self.anchors.get(symbol)
    }
}

impl DiffExtractor for TradeDiffExtractor {
    type Record = Trade;

    fn extract(&mut self, symbols: &[String], caches: &FeedCaches) -> Vec<Arc<Trade>> {
        let mut trades = Vec::new();
        for symbol in symbols {
            let anchors = &mut self.anchors;
            caches.with_trades(symbol, |cache| {
                let limit = cache.new_updates();
                if limit == 0 {
                    return;
                }
                let start = cache.len() - limit;
                let Some(first) = cache.get(start) else {
                    return;
                };
                if anchors.get(symbol).is_some_and(|anchor| Arc::ptr_eq(anchor, first)) {
                    return;
                }
                anchors.insert(symbol.clone(), Arc::clone(first));
                trades.extend(cache.iter_from(start).cloned());
            });
        }
        trades
    }
}
