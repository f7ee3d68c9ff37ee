use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use mdstream_metadata::Pipeline;

use crate::consumer::{Consumer, ConsumerMessage};
use crate::error::ConsumerError;

/// How a [`RecordingConsumer`] reacts to the next calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FailureMode {
    Accept = 0,
    Reject = 1,
    Panic = 2,
}

impl FailureMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Reject,
            2 => Self::Panic,
            _ => Self::Accept,
        }
    }
}

/// Records every batch it receives, optionally failing on demand
pub struct RecordingConsumer {
    received: Mutex<Vec<ConsumerMessage>>,
    failure: AtomicU8,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            failure: AtomicU8::new(FailureMode::Accept as u8),
        }
    }

    pub fn set_failure_mode(&self, mode: FailureMode) {
        self.failure.store(mode as u8, Ordering::SeqCst);
    }

    /// Snapshot of everything received so far
    pub fn messages(&self) -> Vec<ConsumerMessage> {
        self.received
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn failure_mode(&self) -> FailureMode {
        FailureMode::from_u8(self.failure.load(Ordering::SeqCst))
    }

    pub fn count(&self) -> usize {
        self.received.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    fn record(&self, pipeline: Pipeline, broker: &str, payload: Bytes) -> Result<(), ConsumerError> {
        match self.failure_mode() {
            FailureMode::Reject => {
                return Err(ConsumerError::Rejected(format!("{} {}", broker, pipeline)))
            }
            FailureMode::Panic => panic!("consumer failure injected for {}", broker),
            FailureMode::Accept => {}
        }
        if let Ok(mut guard) = self.received.lock() {
            guard.push(ConsumerMessage {
                broker: broker.to_string(),
                pipeline,
                payload,
            });
        }
        Ok(())
    }
}

impl Default for RecordingConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl Consumer for RecordingConsumer {
    fn on_trades_received(&self, broker: &str, payload: Bytes) -> Result<(), ConsumerError> {
        self.record(Pipeline::Trades, broker, payload)
    }

    fn on_bids_asks_received(&self, broker: &str, payload: Bytes) -> Result<(), ConsumerError> {
        self.record(Pipeline::BidsAsks, broker, payload)
    }
}
