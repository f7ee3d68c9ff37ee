use bytes::Bytes;
use mdstream_metadata::Pipeline;
use tracing::debug;

use crate::error::ConsumerError;

/// One encoded batch addressed to the downstream consumer
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub broker: String,
    pub pipeline: Pipeline,
    /// JSON array of records
    pub payload: Bytes,
}

/// Downstream consumer of new market data.
///
/// Calls are synchronous from the engine's point of view and are never made
/// with an empty batch. A returned error is logged by the caller and dropped.
pub trait Consumer: Send + Sync {
    /// New trades for a broker, encoded as a JSON array
    fn on_trades_received(&self, broker: &str, payload: Bytes) -> Result<(), ConsumerError>;

    /// Changed best bid/ask snapshots for a broker, encoded as a JSON array
    fn on_bids_asks_received(&self, broker: &str, payload: Bytes) -> Result<(), ConsumerError>;

    /// Dispatch by pipeline
    fn receive(&self, pipeline: Pipeline, broker: &str, payload: Bytes) -> Result<(), ConsumerError> {
        match pipeline {
            Pipeline::Trades => self.on_trades_received(broker, payload),
            Pipeline::BidsAsks => self.on_bids_asks_received(broker, payload),
        }
    }
}

/// Logs batch sizes via tracing, keeps nothing
pub struct LogConsumer;

impl Consumer for LogConsumer {
    fn on_trades_received(&self, broker: &str, payload: Bytes) -> Result<(), ConsumerError> {
        debug!(broker = %broker, bytes = payload.len(), "Trades received");
        Ok(())
    }

    fn on_bids_asks_received(&self, broker: &str, payload: Bytes) -> Result<(), ConsumerError> {
        debug!(broker = %broker, bytes = payload.len(), "Bids/asks received");
        Ok(())
    }
}

/// Drops every batch
pub struct DiscardConsumer;

impl Consumer for DiscardConsumer {
    fn on_trades_received(&self, _broker: &str, _payload: Bytes) -> Result<(), ConsumerError> {
        Ok(())
    }

    fn on_bids_asks_received(&self, _broker: &str, _payload: Bytes) -> Result<(), ConsumerError> {
        Ok(())
    }
}
