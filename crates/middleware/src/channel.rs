//! Consumer that forwards batches over a bounded tokio channel
//!
//! Uses `try_send` so the engine never waits on the receiving side.

use bytes::Bytes;
use mdstream_metadata::Pipeline;
use tokio::sync::mpsc;

use crate::consumer::{Consumer, ConsumerMessage};
use crate::error::ConsumerError;

pub struct ChannelConsumer {
    tx: mpsc::Sender<ConsumerMessage>,
}

impl ChannelConsumer {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ConsumerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn forward(&self, pipeline: Pipeline, broker: &str, payload: Bytes) -> Result<(), ConsumerError> {
        let msg = ConsumerMessage {
            broker: broker.to_string(),
            pipeline,
            payload,
        };
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConsumerError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => ConsumerError::ChannelClosed,
        })
    }
}

impl Consumer for ChannelConsumer {
    fn on_trades_received(&self, broker: &str, payload: Bytes) -> Result<(), ConsumerError> {
        self.forward(Pipeline::Trades, broker, payload)
    }

    fn on_bids_asks_received(&self, broker: &str, payload: Bytes) -> Result<(), ConsumerError> {
        self.forward(Pipeline::BidsAsks, broker, payload)
    }
}
