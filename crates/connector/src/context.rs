//! Engine context threaded into every session

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mdstream_metadata::{EngineConfig, Pipeline, DEFAULT_BATCH_SIZES, DEFAULT_MARKET_TYPE};
use mdstream_middleware::Consumer;

use crate::batcher::BatchSize;
use crate::registry::ConnectionRegistry;

pub const TRADES_PROCESSING_INTERVAL: Duration = Duration::from_millis(100);
pub const BIDS_ASKS_PROCESSING_INTERVAL: Duration = Duration::from_millis(100);
pub const REFRESH_SUBSCRIPTIONS_INTERVAL: Duration = Duration::from_secs(10);
pub const METRICS_INTERVAL: Duration = Duration::from_secs(60);
/// A tick running longer than its period minus this margin is logged as overload
pub const OVERLOAD_MARGIN: Duration = Duration::from_millis(10);

/// Periods of the per-session tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub trades_interval: Duration,
    pub bids_asks_interval: Duration,
    pub refresh_interval: Duration,
    pub metrics_interval: Duration,
    pub overload_margin: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            trades_interval: TRADES_PROCESSING_INTERVAL,
            bids_asks_interval: BIDS_ASKS_PROCESSING_INTERVAL,
            refresh_interval: REFRESH_SUBSCRIPTIONS_INTERVAL,
            metrics_interval: METRICS_INTERVAL,
            overload_margin: OVERLOAD_MARGIN,
        }
    }
}

impl Timings {
    pub fn processing_interval(&self, pipeline: Pipeline) -> Duration {
        match pipeline {
            Pipeline::Trades => self.trades_interval,
            Pipeline::BidsAsks => self.bids_asks_interval,
        }
    }
}

/// Everything a session needs, constructed once at startup
pub struct EngineContext {
    pub registry: Arc<ConnectionRegistry>,
    pub consumer: Arc<dyn Consumer>,
    pub market_type: String,
    pub timings: Timings,
    batch_sizes: HashMap<String, usize>,
}

impl EngineContext {
    pub fn new(registry: Arc<ConnectionRegistry>, consumer: Arc<dyn Consumer>) -> Self {
        Self {
            registry,
            consumer,
            market_type: DEFAULT_MARKET_TYPE.to_string(),
            timings: Timings::default(),
            batch_sizes: DEFAULT_BATCH_SIZES
                .iter()
                .map(|(broker, size)| (broker.to_string(), *size))
                .collect(),
        }
    }

    pub fn from_config(
        config: &EngineConfig,
        registry: Arc<ConnectionRegistry>,
        consumer: Arc<dyn Consumer>,
    ) -> Self {
        let mut ctx = Self::new(registry, consumer).with_market_type(config.market_type.clone());
        for broker in &config.brokers {
            if let Some(size) = config.batch_size(&broker.name) {
                ctx = ctx.with_batch_size(broker.name.clone(), size);
            }
        }
        ctx
    }

    pub fn with_batch_size(mut self, broker: impl Into<String>, size: usize) -> Self {
        self.batch_sizes.insert(broker.into(), size);
        self
    }

    pub fn with_market_type(mut self, market_type: impl Into<String>) -> Self {
        self.market_type = market_type.into();
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Subscription batch size for a broker; unbounded when not configured
    pub fn batch_size(&self, broker: &str) -> BatchSize {
        BatchSize::from_option(self.batch_sizes.get(broker).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdstream_metadata::{BrokerConfig, BrokerMapping, SinkConfig};
    use mdstream_middleware::DiscardConsumer;

    fn context() -> EngineContext {
        EngineContext::new(
            Arc::new(ConnectionRegistry::new(BrokerMapping::default())),
            Arc::new(DiscardConsumer),
        )
    }

    #[test]
    fn test_default_batch_sizes() {
        let ctx = context();
        assert_eq!(ctx.batch_size("BINANCE").limit(), Some(200));
        assert_eq!(ctx.batch_size("KRAKEN"), BatchSize::UNBOUNDED);
    }

    #[test]
    fn test_from_config_overrides() {
        let config = EngineConfig {
            name: "test".to_string(),
            market_type: "spot".to_string(),
            brokers: vec![
                BrokerConfig {
                    name: "KRAKEN".to_string(),
                    venue: None,
                    batch_size: Some(25),
                    pipelines: Pipeline::ALL.to_vec(),
                    markets: Vec::new(),
                },
                BrokerConfig {
                    name: "BINANCE".to_string(),
                    venue: None,
                    batch_size: None,
                    pipelines: vec![Pipeline::Trades],
                    markets: Vec::new(),
                },
            ],
            sink: SinkConfig::default(),
        };
        let ctx = EngineContext::from_config(
            &config,
            Arc::new(ConnectionRegistry::new(config.broker_mapping())),
            Arc::new(DiscardConsumer),
        );
        assert_eq!(ctx.batch_size("KRAKEN").limit(), Some(25));
        assert_eq!(ctx.batch_size("BINANCE").limit(), Some(200));
        assert_eq!(ctx.market_type, "spot");
    }

    #[test]
    fn test_default_timings() {
        let timings = Timings::default();
        assert_eq!(timings.processing_interval(Pipeline::Trades), Duration::from_millis(100));
        assert_eq!(timings.processing_interval(Pipeline::BidsAsks), Duration::from_millis(100));
        assert_eq!(timings.refresh_interval, Duration::from_secs(10));
        assert_eq!(timings.metrics_interval, Duration::from_secs(60));
    }
}
