//! Broker identity mapping
//!
//! A broker is the name the engine is asked to stream for (e.g. `BINANCE`);
//! a venue is the exchange implementation that serves it (e.g. `binance`).

use std::collections::HashMap;

/// Built-in broker → venue aliases
const DEFAULT_BROKER_VENUES: &[(&str, &str)] = &[
    ("BINANCE", "binance"),
    ("BINANCEUS", "binanceus"),
    ("HITBTC", "hitbtc"),
    ("BITFINEX", "bitfinex"),
    ("KRAKEN", "kraken"),
    ("GATEIO", "gate"),
];

/// Built-in maximum subscription batch sizes. Brokers not listed are unbounded.
pub const DEFAULT_BATCH_SIZES: &[(&str, usize)] = &[("BINANCE", 200)];

/// Bidirectional broker ↔ venue name mapping
#[derive(Debug, Clone)]
pub struct BrokerMapping {
    to_venue: HashMap<String, String>,
    to_broker: HashMap<String, String>,
}

impl BrokerMapping {
    /// Empty mapping; every broker falls back to its lowercased name
    pub fn empty() -> Self {
        Self {
            to_venue: HashMap::new(),
            to_broker: HashMap::new(),
        }
    }

    /// Register (or override) a broker alias
    pub fn insert(&mut self, broker: impl Into<String>, venue: impl Into<String>) {
        let broker = broker.into();
        let venue = venue.into();
        if let Some(previous) = self.to_venue.insert(broker.clone(), venue.clone()) {
            self.to_broker.remove(&previous);
        }
        self.to_broker.insert(venue, broker);
    }

    /// Venue name for a broker, lowercased broker name when no alias exists
    pub fn venue_for(&self, broker: &str) -> String {
        self.to_venue
            .get(broker)
            .cloned()
            .unwrap_or_else(|| broker.to_lowercase())
    }

    /// Broker name for a venue, uppercased venue name when no alias exists
    pub fn broker_for(&self, venue: &str) -> String {
        self.to_broker
            .get(venue)
            .cloned()
            .unwrap_or_else(|| venue.to_uppercase())
    }
}

impl Default for BrokerMapping {
    fn default() -> Self {
        let mut mapping = Self::empty();
        for (broker, venue) in DEFAULT_BROKER_VENUES {
            mapping.insert(*broker, *venue);
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_aliases() {
        let mapping = BrokerMapping::default();
        assert_eq!(mapping.venue_for("GATEIO"), "gate");
        assert_eq!(mapping.venue_for("BINANCE"), "binance");
        assert_eq!(mapping.broker_for("gate"), "GATEIO");
    }

    #[test]
    fn test_unknown_broker_falls_back_to_case_change() {
        let mapping = BrokerMapping::default();
        assert_eq!(mapping.venue_for("COINBASE"), "coinbase");
        assert_eq!(mapping.broker_for("coinbase"), "COINBASE");
    }

    #[test]
    fn test_override_replaces_reverse_entry() {
        let mut mapping = BrokerMapping::default();
        mapping.insert("KRAKEN", "kraken-v2");

        assert_eq!(mapping.venue_for("KRAKEN"), "kraken-v2");
        assert_eq!(mapping.broker_for("kraken-v2"), "KRAKEN");
        // old venue no longer resolves to the alias
        assert_eq!(mapping.broker_for("kraken"), "KRAKEN");
        assert_eq!(mapping.broker_for("gate"), "GATEIO");
    }
}
