//! Connection-owned record caches
//!
//! Venue tasks append trades and overwrite quotes here; the engine reads
//! them on every tick. Records are stored behind `Arc` so readers can keep
//! a reference to the exact object they last saw.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;

use crate::record::{Quote, Trade};

/// Default number of trades kept per symbol
pub const DEFAULT_TRADES_LIMIT: usize = 1000;

/// Bounded per-symbol trade history with an appends-since-last-query counter.
///
/// Querying [`TradeCache::new_updates`] does not reset the counter
/// immediately: the reset happens on the next append. Repeated queries with
/// no appends in between keep reporting the previous count.
#[derive(Debug)]
pub struct TradeCache {
    items: VecDeque<Arc<Trade>>,
    max_size: usize,
    new_updates: usize,
    clear_on_append: bool,
}

impl TradeCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_size.min(DEFAULT_TRADES_LIMIT)),
            max_size: max_size.max(1),
            new_updates: 0,
            clear_on_append: false,
        }
    }

    /// Append a trade, evicting the oldest one when full
    pub fn append(&mut self, trade: Arc<Trade>) {
        if self.items.len() == self.max_size {
            self.items.pop_front();
        }
        self.items.push_back(trade);
        if self.clear_on_append {
            self.clear_on_append = false;
            self.new_updates = 0;
        }
        self.new_updates += 1;
    }

    /// Number of trades appended since the previous query, capped at the
    /// number of trades still held
    pub fn new_updates(&mut self) -> usize {
        self.clear_on_append = true;
        self.new_updates.min(self.items.len())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Trade>> {
        self.items.get(index)
    }

    /// Trades from `start` to the newest, oldest first
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = &Arc<Trade>> {
        self.items.range(start.min(self.items.len())..)
    }
}

/// Trade and quote caches for every symbol of one connection
#[derive(Debug)]
pub struct FeedCaches {
    trades: DashMap<String, TradeCache>,
    bids_asks: DashMap<String, Arc<Quote>>,
    trades_limit: usize,
}

impl FeedCaches {
    pub fn new() -> Self {
        Self::with_trades_limit(DEFAULT_TRADES_LIMIT)
    }

    pub fn with_trades_limit(trades_limit: usize) -> Self {
        Self {
            trades: DashMap::new(),
            bids_asks: DashMap::new(),
            trades_limit,
        }
    }

    /// Append a trade to its symbol's cache, returning the stored reference
    pub fn append_trade(&self, trade: Trade) -> Arc<Trade> {
        let trade = Arc::new(trade);
        self.trades
            .entry(trade.symbol.clone())
            .or_insert_with(|| TradeCache::new(self.trades_limit))
            .append(Arc::clone(&trade));
        trade
    }

    /// Replace the latest quote for its symbol, returning the stored reference
    pub fn set_quote(&self, quote: Quote) -> Arc<Quote> {
        let quote = Arc::new(quote);
        self.bids_asks.insert(quote.symbol.clone(), Arc::clone(&quote));
        quote
    }

    /// Run `f` against a symbol's trade cache; `None` when nothing arrived yet
    pub fn with_trades<R>(&self, symbol: &str, f: impl FnOnce(&mut TradeCache) -> R) -> Option<R> {
        self.trades.get_mut(symbol).map(|mut cache| f(&mut cache))
    }

    pub fn quote(&self, symbol: &str) -> Option<Arc<Quote>> {
        self.bids_asks.get(symbol).map(|q| Arc::clone(q.value()))
    }
}

impl Default for FeedCaches {
    fn default() -> Self {
        Self::new()
    }
}
