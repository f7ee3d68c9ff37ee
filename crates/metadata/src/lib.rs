//! mdstream-metadata: Configuration types for the market data streamer
//!
//! Broker identity mapping, per-broker subscription batch sizes and the
//! YAML engine configuration loaded by the connector binary.

pub mod broker;
pub mod config;
pub mod error;

pub use broker::{BrokerMapping, DEFAULT_BATCH_SIZES};
pub use config::{
    BrokerConfig, EngineConfig, Pipeline, SinkConfig, SinkType, DEFAULT_MARKET_TYPE, MEMORY_VENUE,
};
pub use error::MetadataError;
