use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::FeedCaches;
use crate::extract::DiffExtractor;
use crate::record::Quote;

/// Emits each symbol's quote snapshot once per replacement
#[derive(Debug, Default)]
pub struct QuoteDiffExtractor {
    last: HashMap<String, Arc<Quote>>,
}

impl QuoteDiffExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self, symbol: &str) -> Option<&Arc<Quote>> {
        self.last.get(symbol)
    }
}

impl DiffExtractor for QuoteDiffExtractor {
    type Record = Quote;

    fn extract(&mut self, symbols: &[String], caches: &FeedCaches) -> Vec<Arc<Quote>> {
        let mut quotes = Vec::new();
        for symbol in symbols {
            let Some(quote) = caches.quote(symbol) else {
                continue;
            };
            if self
                .last
                .get(symbol)
                .is_some_and(|last| Arc::ptr_eq(last, &quote))
            {
                continue;
            }
            self.last.insert(symbol.clone(), Arc::clone(&quote));
            quotes.push(quote);
        }
        quotes
    }
}
