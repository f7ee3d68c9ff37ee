//! Per-session receive counters and the periodic reporter

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mdstream_metadata::Pipeline;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Records received by a session, shared between its poller and reporter
#[derive(Debug, Default)]
pub struct SessionCounters {
    received_this_minute: AtomicU64,
    received_total: AtomicU64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, count: usize) {
        let count = count as u64;
        self.received_this_minute.fetch_add(count, Ordering::Relaxed);
        self.received_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn this_minute(&self) -> u64 {
        self.received_this_minute.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.received_total.load(Ordering::Relaxed)
    }

    /// Read and reset the per-period counter
    pub fn take_minute(&self) -> u64 {
        self.received_this_minute.swap(0, Ordering::Relaxed)
    }
}

/// Snapshot produced by one report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub this_minute: u64,
    pub total: u64,
    /// Seconds since the reporter was created
    pub elapsed_secs: u64,
    pub per_second: u64,
}

pub struct MetricsReporter {
    broker: String,
    pipeline: Pipeline,
    counters: Arc<SessionCounters>,
    started: Instant,
}

impl MetricsReporter {
    pub fn new(broker: impl Into<String>, pipeline: Pipeline, counters: Arc<SessionCounters>) -> Self {
        Self {
            broker: broker.into(),
            pipeline,
            counters,
            started: Instant::now(),
        }
    }

    /// Log and reset the per-period count
    pub fn report(&self) -> Report {
        let this_minute = self.counters.take_minute();
        let total = self.counters.total();
        let elapsed_secs = self.started.elapsed().as_secs();
        let per_second = if elapsed_secs > 0 { total / elapsed_secs } else { total };

        debug!(
            broker = %self.broker,
            pipeline = %self.pipeline,
            this_minute,
            total,
            elapsed_secs,
            per_second,
            "Received {} in the last period", self.pipeline
        );

        Report {
            this_minute,
            total,
            elapsed_secs,
            per_second,
        }
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
                    self.report();
                }
            }
        }
        info!(broker = %self.broker, pipeline = %self.pipeline, "Metrics reporter stopped");
    }
}
