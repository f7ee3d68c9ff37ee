use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::FeedCaches;
use crate::error::FeedError;

/// Live connection to one venue, scoped to a broker and pipeline.
///
/// Subscriptions populate [`FeedCaches`] in the background; the engine
/// never awaits individual updates.
#[async_trait]
pub trait FeedConnection: Send + Sync {
    /// Connection identity (e.g. `BINANCE-trades-streamer`)
    fn id(&self) -> &str;

    /// Load market metadata; required before symbols can be listed
    async fn load_markets(&self) -> Result<(), FeedError>;

    /// Tradable symbols of a market type, in venue order
    fn symbols_for_market_type(&self, market_type: &str) -> Result<Vec<String>, FeedError>;

    /// Request trade updates for a batch of symbols. Re-requesting an
    /// existing subscription must not duplicate it.
    async fn watch_trades_for_symbols(&self, symbols: &[String]) -> Result<(), FeedError>;

    /// Request best bid/ask updates for a batch of symbols
    async fn watch_bids_asks(&self, symbols: &[String]) -> Result<(), FeedError>;

    /// Caches populated by active subscriptions
    fn caches(&self) -> &FeedCaches;
}

/// Parameters for acquiring a connection
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub broker: String,
    pub venue: String,
    pub connection_id: String,
    /// Deliver only incremental updates
    pub new_updates: bool,
}

/// Creates connections for one venue
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self, request: &ConnectionRequest) -> Result<Arc<dyn FeedConnection>, FeedError>;
}
