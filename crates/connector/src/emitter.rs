//! Hands extracted records to the downstream consumer

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use mdstream_metadata::Pipeline;
use mdstream_middleware::{Consumer, ConsumerError};
use serde::Serialize;
use tracing::error;

use crate::metrics::SessionMetrics;

/// Result of one emit call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Nothing to deliver, consumer not called
    Empty,
    Delivered,
    /// Consumer (or encoding) failed; the batch is dropped
    Failed,
}

/// Delivers batches for one broker and pipeline.
///
/// Failures are logged and never propagate to the caller's loop.
pub struct Emitter {
    broker: String,
    pipeline: Pipeline,
    consumer: Arc<dyn Consumer>,
    metrics: SessionMetrics,
}

impl Emitter {
    pub fn new(broker: impl Into<String>, pipeline: Pipeline, consumer: Arc<dyn Consumer>) -> Self {
        let broker = broker.into();
        let metrics = SessionMetrics::new(broker.clone(), pipeline);
        Self {
            broker,
            pipeline,
            consumer,
            metrics,
        }
    }

    pub fn emit<R: Serialize>(&self, records: &[Arc<R>]) -> EmitOutcome {
        if records.is_empty() {
            return EmitOutcome::Empty;
        }

        let payload = match encode(records) {
            Ok(payload) => payload,
            Err(e) => {
                error!(broker = %self.broker, pipeline = %self.pipeline, error = %e, "Failed to encode records");
                self.metrics.inc_consumer_failure();
                return EmitOutcome::Failed;
            }
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            self.consumer.receive(self.pipeline, &self.broker, payload)
        }))
        .unwrap_or_else(|panic| Err(ConsumerError::Panicked(panic_message(&panic))));

        match result {
            Ok(()) => EmitOutcome::Delivered,
            Err(e) => {
                error!(
                    broker = %self.broker,
                    pipeline = %self.pipeline,
                    records = records.len(),
                    error = %e,
                    "Consumer failed to accept {}", self.pipeline
                );
                self.metrics.inc_consumer_failure();
                EmitOutcome::Failed
            }
        }
    }
}

fn encode<R: Serialize>(records: &[Arc<R>]) -> Result<Bytes, serde_json::Error> {
    let refs: Vec<&R> = records.iter().map(|r| r.as_ref()).collect();
    serde_json::to_vec(&refs).map(Bytes::from)
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
