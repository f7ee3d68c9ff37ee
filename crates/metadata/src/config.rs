use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::broker::{BrokerMapping, DEFAULT_BATCH_SIZES};
use crate::error::MetadataError;

/// Market type whose symbol universe is streamed
pub const DEFAULT_MARKET_TYPE: &str = "spot";

/// Venue served from configuration instead of a live feed
pub const MEMORY_VENUE: &str = "memory";

/// Kind of data a session streams
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    Trades,
    BidsAsks,
}

impl Pipeline {
    pub const ALL: [Pipeline; 2] = [Pipeline::Trades, Pipeline::BidsAsks];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Trades => "trades",
            Pipeline::BidsAsks => "bidsasks",
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub name: String,
    /// Venue implementation override (defaults to the built-in alias)
    #[serde(default)]
    pub venue: Option<String>,
    /// Maximum symbols per subscription request; unset means a single batch
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default = "default_pipelines")]
    pub pipelines: Vec<Pipeline>,
    /// Symbols served when the broker runs on the `memory` venue
    #[serde(default)]
    pub markets: Vec<String>,
}

fn default_pipelines() -> Vec<Pipeline> {
    Pipeline::ALL.to_vec()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    #[default]
    Log,
    Jsonl,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(rename = "type", default)]
    pub sink_type: SinkType,
    /// Base directory for date-partitioned JSONL output
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    #[serde(default = "default_market_type")]
    pub market_type: String,
    pub brokers: Vec<BrokerConfig>,
    #[serde(default)]
    pub sink: SinkConfig,
}

fn default_market_type() -> String {
    DEFAULT_MARKET_TYPE.to_string()
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        let mapping = self.broker_mapping();
        let mut seen = HashSet::new();
        for broker in &self.brokers {
            if broker.name.trim().is_empty() {
                return Err(MetadataError::Validation("broker name is empty".to_string()));
            }
            if !seen.insert(broker.name.as_str()) {
                return Err(MetadataError::Validation(format!(
                    "duplicate broker: {}",
                    broker.name
                )));
            }
            if broker.batch_size == Some(0) {
                return Err(MetadataError::Validation(format!(
                    "batch_size for {} must be positive",
                    broker.name
                )));
            }
            if mapping.venue_for(&broker.name) == MEMORY_VENUE && broker.markets.is_empty() {
                return Err(MetadataError::Validation(format!(
                    "{} uses the {} venue but lists no markets",
                    broker.name, MEMORY_VENUE
                )));
            }
        }
        if self.sink.sink_type == SinkType::Jsonl && self.sink.path.is_none() {
            return Err(MetadataError::Validation(
                "jsonl sink requires a path".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in aliases overlaid with per-broker venue overrides
    pub fn broker_mapping(&self) -> BrokerMapping {
        let mut mapping = BrokerMapping::default();
        for broker in &self.brokers {
            if let Some(ref venue) = broker.venue {
                mapping.insert(broker.name.clone(), venue.clone());
            }
        }
        mapping
    }

    /// Markets of every broker on the `memory` venue, first occurrence wins
    pub fn memory_markets(&self) -> Vec<String> {
        let mapping = self.broker_mapping();
        let mut seen = HashSet::new();
        self.brokers
            .iter()
            .filter(|b| mapping.venue_for(&b.name) == MEMORY_VENUE)
            .flat_map(|b| b.markets.iter())
            .filter(|symbol| seen.insert(symbol.as_str()))
            .cloned()
            .collect()
    }

    /// Configured batch size, falling back to the built-in table
    pub fn batch_size(&self, broker: &str) -> Option<usize> {
        self.brokers
            .iter()
            .find(|b| b.name == broker)
            .and_then(|b| b.batch_size)
            .or_else(|| default_batch_size(broker))
    }
}

/// Built-in batch size for a broker, if any
pub fn default_batch_size(broker: &str) -> Option<usize> {
    DEFAULT_BATCH_SIZES
        .iter()
        .find(|(name, _)| *name == broker)
        .map(|(_, size)| *size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name: crypto-spot
brokers:
  - name: BINANCE
  - name: KRAKEN
    batch_size: 50
    pipelines: [trades]
  - name: SANDBOX
    venue: memory
    markets: [BTC/USD, ETH/USD]
sink:
  type: jsonl
  path: /var/lib/mdstream
"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "crypto-spot");
        assert_eq!(config.market_type, "spot");
        assert_eq!(config.brokers.len(), 3);
        assert_eq!(config.brokers[0].pipelines, Pipeline::ALL.to_vec());
        assert_eq!(config.brokers[1].pipelines, vec![Pipeline::Trades]);
        assert_eq!(config.sink.sink_type, SinkType::Jsonl);

        assert_eq!(config.batch_size("BINANCE"), Some(200));
        assert_eq!(config.batch_size("KRAKEN"), Some(50));
        assert_eq!(config.batch_size("SANDBOX"), None);

        let mapping = config.broker_mapping();
        assert_eq!(mapping.venue_for("SANDBOX"), "memory");
        assert_eq!(mapping.venue_for("KRAKEN"), "kraken");
        assert_eq!(config.memory_markets(), vec!["BTC/USD", "ETH/USD"]);
    }

    #[test]
    fn test_memory_venue_requires_markets() {
        let config: EngineConfig = serde_yaml::from_str(
            r#"
name: sandbox
brokers:
  - name: SANDBOX
    venue: memory
"#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lists no markets"));
    }

    #[test]
    fn test_memory_markets_merged_across_brokers() {
        let config: EngineConfig = serde_yaml::from_str(
            r#"
name: sandbox
brokers:
  - name: ALPHA
    venue: memory
    markets: [BTC/USD, ETH/USD]
  - name: BETA
    venue: memory
    markets: [ETH/USD, SOL/USD]
  - name: KRAKEN
    markets: [XRP/USD]
"#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.memory_markets(), vec!["BTC/USD", "ETH/USD", "SOL/USD"]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config: EngineConfig = serde_yaml::from_str(
            r#"
name: bad
brokers:
  - name: BINANCE
    batch_size: 0
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(MetadataError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_broker_rejected() {
        let config: EngineConfig = serde_yaml::from_str(
            r#"
name: bad
brokers:
  - name: KRAKEN
  - name: KRAKEN
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate broker"));
    }

    #[test]
    fn test_jsonl_sink_requires_path() {
        let config: EngineConfig = serde_yaml::from_str(
            r#"
name: bad
brokers: []
sink:
  type: jsonl
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_display() {
        assert_eq!(Pipeline::Trades.to_string(), "trades");
        assert_eq!(Pipeline::BidsAsks.to_string(), "bidsasks");
    }
}
