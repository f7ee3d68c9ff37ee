//! Diff-extract-and-emit loop of a session

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use mdstream_metadata::Pipeline;
use mdstream_middleware::{now_tsc, CLOCK};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::emitter::{panic_message, EmitOutcome, Emitter};
use crate::extract::DiffExtractor;
use crate::metrics::SessionMetrics;
use crate::reporter::SessionCounters;
use crate::traits::FeedConnection;

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub records: usize,
    pub emit: EmitOutcome,
    pub elapsed: Duration,
}

pub struct Poller<E: DiffExtractor> {
    broker: String,
    pipeline: Pipeline,
    connection: Arc<dyn FeedConnection>,
    symbols: Arc<[String]>,
    extractor: E,
    emitter: Emitter,
    counters: Arc<SessionCounters>,
    metrics: SessionMetrics,
    period: Duration,
    overload_margin: Duration,
}

impl<E: DiffExtractor> Poller<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        broker: impl Into<String>,
        pipeline: Pipeline,
        connection: Arc<dyn FeedConnection>,
        symbols: Arc<[String]>,
        extractor: E,
        emitter: Emitter,
        counters: Arc<SessionCounters>,
        period: Duration,
        overload_margin: Duration,
    ) -> Self {
        let broker = broker.into();
        let metrics = SessionMetrics::new(broker.clone(), pipeline);
        Self {
            broker,
            pipeline,
            connection,
            symbols,
            extractor,
            emitter,
            counters,
            metrics,
            period,
            overload_margin,
        }
    }

    /// Extract new records for the whole universe and hand them on.
    ///
    /// The total counter is bumped before emitting, so records the consumer
    /// rejects still count as received.
    pub fn tick(&mut self) -> TickOutcome {
        let start = now_tsc();

        let records = self
            .extractor
            .extract(&self.symbols, self.connection.caches());
        let count = records.len();
        if count > 0 {
            self.counters.record(count);
            self.metrics.add_records(count);
        }
        let emit = self.emitter.emit(&records);

        let elapsed = CLOCK.delta(start, now_tsc());
        self.metrics.inc_tick();
        if elapsed + self.overload_margin > self.period {
            self.metrics.inc_tick_overrun();
            warn!(
                broker = %self.broker,
                pipeline = %self.pipeline,
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = self.period.as_millis() as u64,
                records = count,
                "Processing {} is overloaded", self.pipeline
            );
        }

        TickOutcome {
            records: count,
            emit,
            elapsed,
        }
    }

    /// Tick every period until shutdown. A panicking tick is logged and the
    /// next one runs as scheduled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.tick())) {
                        error!(
                            broker = %self.broker,
                            pipeline = %self.pipeline,
                            error = %panic_message(&panic),
                            "Tick failed"
                        );
                    }
                }
            }
        }
        info!(broker = %self.broker, pipeline = %self.pipeline, "Poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FeedCaches;
    use crate::extract::{QuoteDiffExtractor, TradeDiffExtractor};
    use crate::memory::InMemoryVenue;
    use crate::record::{Quote, Trade};
    use crate::traits::{ConnectionFactory, ConnectionRequest};
    use mdstream_middleware::memory::{FailureMode, RecordingConsumer};

    const PERIOD: Duration = Duration::from_millis(100);
    const MARGIN: Duration = Duration::from_millis(10);

    fn symbols() -> Arc<[String]> {
        vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()].into()
    }

    fn trade(symbol: &str, id: &str) -> Trade {
        Trade::new(symbol, Some(id.to_string()), 1_700_000_000_000, None, 10.0, 2.0)
    }

    async fn connection(venue: &InMemoryVenue, id: &str) -> Arc<dyn FeedConnection> {
        venue
            .create(&ConnectionRequest {
                broker: "BINANCE".to_string(),
                venue: "binance".to_string(),
                connection_id: id.to_string(),
                new_updates: true,
            })
            .await
            .unwrap()
    }

    fn trades_poller(
        broker: &str,
        conn: Arc<dyn FeedConnection>,
        consumer: Arc<RecordingConsumer>,
        counters: Arc<SessionCounters>,
    ) -> Poller<TradeDiffExtractor> {
        Poller::new(
            broker,
            Pipeline::Trades,
            conn,
            symbols(),
            TradeDiffExtractor::new(),
            Emitter::new(broker, Pipeline::Trades, consumer),
            counters,
            PERIOD,
            MARGIN,
        )
    }

    fn decode_ids(payload: &[u8]) -> Vec<String> {
        let values: Vec<serde_json::Value> = serde_json::from_slice(payload).unwrap();
        values
            .iter()
            .map(|v| v["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_tick_emits_new_trades_in_universe_order() {
        let venue = InMemoryVenue::new();
        let conn = connection(&venue, "t").await;
        let consumer = Arc::new(RecordingConsumer::new());
        let counters = Arc::new(SessionCounters::new());
        let mut poller = trades_poller("BINANCE", conn.clone(), consumer.clone(), counters.clone());

        let caches: &FeedCaches = conn.caches();
        caches.append_trade(trade("ETH/USDT", "e1"));
        caches.append_trade(trade("BTC/USDT", "b1"));
        caches.append_trade(trade("BTC/USDT", "b2"));

        let outcome = poller.tick();
        assert_eq!(outcome.records, 3);
        assert_eq!(outcome.emit, EmitOutcome::Delivered);

        let messages = consumer.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(decode_ids(&messages[0].payload), vec!["b1", "b2", "e1"]);
        assert_eq!(counters.total(), 3);
        assert_eq!(counters.this_minute(), 3);
    }

    #[tokio::test]
    async fn test_quiet_tick_does_not_emit() {
        let venue = InMemoryVenue::new();
        let conn = connection(&venue, "t").await;
        let consumer = Arc::new(RecordingConsumer::new());
        let counters = Arc::new(SessionCounters::new());
        let mut poller = trades_poller("BINANCE", conn.clone(), consumer.clone(), counters.clone());

        conn.caches().append_trade(trade("BTC/USDT", "b1"));
        poller.tick();
        let outcome = poller.tick();

        assert_eq!(outcome.records, 0);
        assert_eq!(outcome.emit, EmitOutcome::Empty);
        assert_eq!(consumer.count(), 1);
        assert_eq!(counters.total(), 1);

        // Nothing at all cached
        let empty = connection(&venue, "empty").await;
        let mut idle = trades_poller("BINANCE", empty, consumer.clone(), counters);
        assert_eq!(idle.tick().emit, EmitOutcome::Empty);
        assert_eq!(consumer.count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_batch_still_counted() {
        let venue = InMemoryVenue::new();
        let conn = connection(&venue, "t").await;
        let consumer = Arc::new(RecordingConsumer::new());
        consumer.set_failure_mode(FailureMode::Reject);
        let counters = Arc::new(SessionCounters::new());
        let mut poller = trades_poller("POLLER-REJECT", conn.clone(), consumer.clone(), counters.clone());

        conn.caches().append_trade(trade("BTC/USDT", "b1"));
        let outcome = poller.tick();

        assert_eq!(outcome.emit, EmitOutcome::Failed);
        assert_eq!(counters.total(), 1);

        consumer.set_failure_mode(FailureMode::Accept);
        conn.caches().append_trade(trade("BTC/USDT", "b2"));
        let outcome = poller.tick();
        assert_eq!(outcome.emit, EmitOutcome::Delivered);
        assert_eq!(decode_ids(&consumer.messages()[0].payload), vec!["b2"]);
    }

    #[tokio::test]
    async fn test_overloaded_tick_is_counted() {
        let venue = InMemoryVenue::new();
        let conn = connection(&venue, "t").await;
        let consumer = Arc::new(RecordingConsumer::new());
        let metrics = SessionMetrics::new("POLLER-OVERLOAD", Pipeline::Trades);

        // Any tick overruns a zero-length period
        let mut overloaded = Poller::new(
            "POLLER-OVERLOAD",
            Pipeline::Trades,
            conn.clone(),
            symbols(),
            TradeDiffExtractor::new(),
            Emitter::new("POLLER-OVERLOAD", Pipeline::Trades, consumer.clone()),
            Arc::new(SessionCounters::new()),
            Duration::ZERO,
            MARGIN,
        );
        conn.caches().append_trade(trade("BTC/USDT", "b1"));
        let outcome = overloaded.tick();

        assert_eq!(outcome.records, 1);
        assert_eq!(outcome.emit, EmitOutcome::Delivered);
        assert_eq!(metrics.ticks(), 1);
        assert_eq!(metrics.tick_overruns(), 1);
    }

    #[tokio::test]
    async fn test_fast_tick_is_not_overloaded() {
        let venue = InMemoryVenue::new();
        let conn = connection(&venue, "t").await;
        let consumer = Arc::new(RecordingConsumer::new());
        let metrics = SessionMetrics::new("POLLER-FAST", Pipeline::Trades);
        let mut poller = trades_poller(
            "POLLER-FAST",
            conn,
            consumer,
            Arc::new(SessionCounters::new()),
        );

        poller.tick();
        poller.tick();

        assert_eq!(metrics.ticks(), 2);
        assert_eq!(metrics.tick_overruns(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_consumer_panic() {
        let venue = InMemoryVenue::new();
        let conn = connection(&venue, "q").await;
        let consumer = Arc::new(RecordingConsumer::new());
        consumer.set_failure_mode(FailureMode::Panic);
        let poller = Poller::new(
            "POLLER-PANIC",
            Pipeline::BidsAsks,
            conn.clone(),
            symbols(),
            QuoteDiffExtractor::new(),
            Emitter::new("POLLER-PANIC", Pipeline::BidsAsks, consumer.clone()),
            Arc::new(SessionCounters::new()),
            PERIOD,
            MARGIN,
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(poller.run(rx));

        conn.caches().set_quote(Quote::new("BTC/USDT", 1, 99.0, 1.0, 101.0, 1.0));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(consumer.count(), 0);

        consumer.set_failure_mode(FailureMode::Accept);
        conn.caches().set_quote(Quote::new("ETH/USDT", 2, 9.0, 1.0, 11.0, 1.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(consumer.count(), 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
