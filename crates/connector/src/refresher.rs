//! Periodic re-subscription of a session's symbol universe

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use mdstream_metadata::Pipeline;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::batcher::{batches, BatchSize};
use crate::error::FeedError;
use crate::metrics::SessionMetrics;
use crate::traits::FeedConnection;

/// Re-issues batch subscriptions so lost streams get re-established.
///
/// Requests are fire-and-forget: [`refresh`](Self::refresh) returns once
/// they are issued and a failing batch never affects the others.
pub struct SubscriptionRefresher {
    broker: String,
    pipeline: Pipeline,
    connection: Arc<dyn FeedConnection>,
    symbols: Arc<[String]>,
    batch_size: BatchSize,
    metrics: SessionMetrics,
}

impl SubscriptionRefresher {
    pub fn new(
        broker: impl Into<String>,
        pipeline: Pipeline,
        connection: Arc<dyn FeedConnection>,
        symbols: Arc<[String]>,
        batch_size: BatchSize,
    ) -> Self {
        let broker = broker.into();
        let metrics = SessionMetrics::new(broker.clone(), pipeline);
        Self {
            broker,
            pipeline,
            connection,
            symbols,
            batch_size,
            metrics,
        }
    }

    /// Issue one subscription request per batch, in batch order.
    ///
    /// The returned handle resolves to the number of failed batches.
    pub fn refresh(&self) -> JoinHandle<usize> {
        let broker = self.broker.clone();
        let pipeline = self.pipeline;
        let connection = Arc::clone(&self.connection);
        let symbols = Arc::clone(&self.symbols);
        let batch_size = self.batch_size;
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let requests = batches(&symbols, batch_size)
                .map(|batch| subscribe(connection.as_ref(), pipeline, batch));
            let results = join_all(requests).await;

            let mut failed = 0;
            for (index, result) in results.into_iter().enumerate() {
                if let Err(e) = result {
                    failed += 1;
                    metrics.inc_subscribe_failure();
                    error!(
                        broker = %broker,
                        pipeline = %pipeline,
                        batch = index,
                        error = %e,
                        "Error watching {} for exchange {}", pipeline, broker
                    );
                }
            }
            debug!(broker = %broker, pipeline = %pipeline, failed, "Subscription refresh issued");
            failed
        })
    }

    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.refresh();
                }
            }
        }
        info!(broker = %self.broker, pipeline = %self.pipeline, "Subscription refresher stopped");
    }
}

async fn subscribe(
    connection: &dyn FeedConnection,
    pipeline: Pipeline,
    batch: &[String],
) -> Result<(), FeedError> {
    match pipeline {
        Pipeline::Trades => connection.watch_trades_for_symbols(batch).await,
        Pipeline::BidsAsks => connection.watch_bids_asks(batch).await,
    }
}
