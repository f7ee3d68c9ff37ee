//! In-memory venue
//!
//! Serves a fixed market list, records subscription requests instead of
//! sending them, and lets callers push records straight into the caches.
//! Used by tests and by the `memory` venue in local runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use mdstream_metadata::Pipeline;

use crate::cache::FeedCaches;
use crate::error::FeedError;
use crate::traits::{ConnectionFactory, ConnectionRequest, FeedConnection};

/// One recorded subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeCall {
    pub pipeline: Pipeline,
    pub symbols: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryVenue {
    markets: HashMap<String, Vec<String>>,
    fail_create: AtomicBool,
    fail_load_markets: AtomicBool,
    load_delay: Option<Duration>,
    connections: DashMap<String, Arc<InMemoryConnection>>,
}

impl InMemoryVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `symbols` under `market_type`, in the given order
    pub fn with_markets<I, S>(mut self, market_type: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.markets
            .insert(market_type.into(), symbols.into_iter().map(Into::into).collect());
        self
    }

    /// Make `load_markets` take `delay` before answering
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Fail every later connection attempt
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Connections created afterwards fail to load markets
    pub fn fail_load_markets(&self) {
        self.fail_load_markets.store(true, Ordering::SeqCst);
    }

    pub fn connection(&self, connection_id: &str) -> Option<Arc<InMemoryConnection>> {
        self.connections.get(connection_id).map(|c| Arc::clone(c.value()))
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryVenue {
    async fn create(&self, request: &ConnectionRequest) -> Result<Arc<dyn FeedConnection>, FeedError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(FeedError::ConnectionFailed(format!(
                "{} refused connection {}",
                request.venue, request.connection_id
            )));
        }

        let connection = Arc::new(InMemoryConnection {
            id: request.connection_id.clone(),
            new_updates: request.new_updates,
            markets: self.markets.clone(),
            fail_load: self.fail_load_markets.load(Ordering::SeqCst),
            load_delay: self.load_delay,
            loaded: AtomicBool::new(false),
            caches: FeedCaches::new(),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        });
        self.connections
            .insert(request.connection_id.clone(), Arc::clone(&connection));
        Ok(connection)
    }
}

pub struct InMemoryConnection {
    id: String,
    new_updates: bool,
    markets: HashMap<String, Vec<String>>,
    fail_load: bool,
    load_delay: Option<Duration>,
    loaded: AtomicBool,
    caches: FeedCaches,
    calls: Mutex<Vec<SubscribeCall>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryConnection {
    pub fn new_updates(&self) -> bool {
        self.new_updates
    }

    /// Subscription requests received so far, in call order
    pub fn calls(&self) -> Vec<SubscribeCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Reject any later batch that contains `symbol`
    pub fn fail_subscriptions_containing(&self, symbol: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(symbol.to_string());
        }
    }

    fn subscribe(&self, pipeline: Pipeline, symbols: &[String]) -> Result<(), FeedError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SubscribeCall {
                pipeline,
                symbols: symbols.to_vec(),
            });
        }
        let failing = self.failing.lock().map(|f| f.clone()).unwrap_or_default();
        match symbols.iter().find(|s| failing.contains(*s)) {
            Some(symbol) => Err(FeedError::Subscribe(format!(
                "{} rejected {} subscription for {}",
                self.id, pipeline, symbol
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FeedConnection for InMemoryConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load_markets(&self) -> Result<(), FeedError> {
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_load {
            return Err(FeedError::LoadMarkets(format!("{} markets unavailable", self.id)));
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn symbols_for_market_type(&self, market_type: &str) -> Result<Vec<String>, FeedError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(FeedError::MarketsNotLoaded);
        }
        self.markets
            .get(market_type)
            .cloned()
            .ok_or_else(|| FeedError::UnsupportedMarketType(market_type.to_string()))
    }

    async fn watch_trades_for_symbols(&self, symbols: &[String]) -> Result<(), FeedError> {
        self.subscribe(Pipeline::Trades, symbols)
    }

    async fn watch_bids_asks(&self, symbols: &[String]) -> Result<(), FeedError> {
        self.subscribe(Pipeline::BidsAsks, symbols)
    }

    fn caches(&self) -> &FeedCaches {
        &self.caches
    }
}
