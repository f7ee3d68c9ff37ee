//! Trade prints and best bid/ask snapshots
//!
//! Serialized in camelCase to keep the record shape downstream consumers
//! already parse.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: Option<String>,
    pub symbol: String,
    /// Exchange timestamp in epoch milliseconds
    pub timestamp: i64,
    pub datetime: String,
    pub side: Option<Side>,
    pub price: f64,
    pub amount: f64,
    pub cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taker_or_maker: Option<String>,
}

impl Trade {
    pub fn new(
        symbol: impl Into<String>,
        id: Option<String>,
        timestamp: i64,
        side: Option<Side>,
        price: f64,
        amount: f64,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            timestamp,
            datetime: iso8601(timestamp),
            side,
            price,
            amount,
            cost: price * amount,
            taker_or_maker: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub timestamp: i64,
    pub datetime: String,
    pub bid: f64,
    pub bid_volume: f64,
    pub ask: f64,
    pub ask_volume: f64,
}

impl Quote {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: i64,
        bid: f64,
        bid_volume: f64,
        ask: f64,
        ask_volume: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            datetime: iso8601(timestamp),
            bid,
            bid_volume,
            ask,
            ask_volume,
        }
    }
}

fn iso8601(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_serializes_camel_case() {
        let trade = Trade::new(
            "BTC/USDT",
            Some("42".to_string()),
            1_700_000_000_000,
            Some(Side::Buy),
            100.0,
            0.5,
        );
        let json = serde_json::to_value(&trade).unwrap();

        assert_eq!(json["symbol"], "BTC/USDT");
        assert_eq!(json["side"], "buy");
        assert_eq!(json["cost"], 50.0);
        assert_eq!(json["datetime"], "2023-11-14T22:13:20.000Z");
        assert!(json.get("takerOrMaker").is_none());
    }

    #[test]
    fn test_quote_serializes_volumes() {
        let quote = Quote::new("ETH/USDT", 0, 10.0, 1.0, 11.0, 2.0);
        let json = serde_json::to_string(&quote).unwrap();
        assert!(json.contains("\"bidVolume\":1.0"));
        assert!(json.contains("\"askVolume\":2.0"));
    }
}
