//! Kraken v2 WebSocket message types
//!
//! Uses `#[serde(untagged)]` since Kraken messages don't have a single consistent tag field.

use chrono::DateTime;
use serde::Deserialize;

use crate::record::{Quote, Side, Trade};

/// Incoming WebSocket messages from Kraken v2 API
///
/// Variant order matters for `#[serde(untagged)]` - serde tries each in order.
/// ChannelMessage (has `data`) must come before Heartbeat (no `data`) since both
/// share `channel` and `type` fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KrakenWsMessage {
    /// Channel data message. `data` is an array for trade/ticker and an
    /// object for instrument.
    ChannelMessage {
        channel: String,
        #[serde(rename = "type")]
        msg_type: String,
        data: serde_json::Value,
    },
    SubscriptionResult {
        method: String,
        success: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
        /// Set on rejections; successes carry the symbol inside `result`
        symbol: Option<String>,
    },
    /// Pong response to app-level ping
    Pong {
        method: String,
        time_in: Option<String>,
        time_out: Option<String>,
    },
    /// Heartbeat (channel=heartbeat, type=update, no data field)
    Heartbeat {
        channel: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
}

/// Best bid/offer from the ticker channel
#[derive(Debug, Clone, Deserialize)]
pub struct KrakenTickerData {
    pub symbol: String,
    pub bid: f64,
    pub bid_qty: f64,
    pub ask: f64,
    pub ask_qty: f64,
    pub timestamp: Option<String>,
}

impl KrakenTickerData {
    /// `now_ms` is used when the update carries no timestamp
    pub fn into_quote(self, now_ms: i64) -> Quote {
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now_ms);
        Quote::new(
            self.symbol,
            timestamp,
            self.bid,
            self.bid_qty,
            self.ask,
            self.ask_qty,
        )
    }
}

/// Kraken sends integer trade ids; older payloads used strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KrakenTradeId {
    Number(u64),
    Text(String),
}

impl KrakenTradeId {
    fn into_string(self) -> String {
        match self {
            KrakenTradeId::Number(n) => n.to_string(),
            KrakenTradeId::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KrakenTradeData {
    pub symbol: String,
    pub side: String,
    pub price: f64,
    pub qty: f64,
    pub ord_type: Option<String>,
    pub trade_id: KrakenTradeId,
    pub timestamp: String,
}

impl KrakenTradeData {
    /// None when the timestamp is unparseable
    pub fn into_trade(self) -> Option<Trade> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        let side = match self.side.as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        };
        Some(Trade::new(
            self.symbol,
            Some(self.trade_id.into_string()),
            timestamp,
            side,
            self.price,
            self.qty,
        ))
    }
}

/// `data` of an instrument snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct KrakenInstrumentData {
    #[serde(default)]
    pub pairs: Vec<KrakenPair>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KrakenPair {
    pub symbol: String,
    pub status: String,
}

impl KrakenInstrumentData {
    /// Symbols currently tradable, in snapshot order
    pub fn online_symbols(&self) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|p| p.status == "online")
            .map(|p| p.symbol.clone())
            .collect()
    }
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICKER_MESSAGE: &str = r#"{"channel":"ticker","type":"update","data":[{"symbol":"BTC/USD","bid":97000.0,"bid_qty":0.50000000,"ask":97000.1,"ask_qty":1.00000000,"last":97000.0,"volume":1234.56789012,"vwap":96500.0,"low":95000.0,"high":98000.0,"change":500.0,"change_pct":0.52,"timestamp":"2026-02-06T12:00:00.250000Z"}]}"#;
    const TRADE_MESSAGE: &str = r#"{"channel":"trade","type":"update","data":[{"symbol":"BTC/USD","side":"buy","price":97000.0,"qty":0.001,"ord_type":"market","trade_id":12345,"timestamp":"2026-02-06T12:00:00.000000Z"}]}"#;
    const INSTRUMENT_SNAPSHOT: &str = r#"{"channel":"instrument","type":"snapshot","data":{"assets":[{"id":"BTC","status":"enabled"}],"pairs":[{"symbol":"BTC/USD","base":"BTC","quote":"USD","status":"online"},{"symbol":"LUNA/USD","base":"LUNA","quote":"USD","status":"delisted"},{"symbol":"ETH/USD","base":"ETH","quote":"USD","status":"online"}]}}"#;
    const HEARTBEAT_MESSAGE: &str = r#"{"channel":"heartbeat","type":"update"}"#;
    const PONG_MESSAGE: &str = r#"{"method":"pong","time_in":"2026-02-06T12:00:00.000000Z","time_out":"2026-02-06T12:00:00.000001Z"}"#;
    const SUBSCRIBE_FAILED: &str = r#"{"method":"subscribe","success":false,"error":"Currency pair not supported FOO/BAR","symbol":"FOO/BAR","time_in":"2026-02-06T12:00:00.000000Z","time_out":"2026-02-06T12:00:00.000001Z"}"#;

    fn channel_data(raw: &str) -> (String, serde_json::Value) {
        match serde_json::from_str::<KrakenWsMessage>(raw).unwrap() {
            KrakenWsMessage::ChannelMessage { channel, data, .. } => (channel, data),
            other => panic!("Expected ChannelMessage variant, got {:?}", other),
        }
    }

    #[test]
    fn test_ticker_into_quote() {
        let (channel, data) = channel_data(TICKER_MESSAGE);
        assert_eq!(channel, "ticker");

        let tickers: Vec<KrakenTickerData> = serde_json::from_value(data).unwrap();
        let quote = tickers[0].clone().into_quote(0);
        assert_eq!(quote.symbol, "BTC/USD");
        assert_eq!(quote.bid, 97000.0);
        assert_eq!(quote.ask_volume, 1.0);
        assert_eq!(quote.timestamp, 1_770_379_200_250);
    }

    #[test]
    fn test_ticker_without_timestamp_uses_now() {
        let ticker = KrakenTickerData {
            symbol: "ETH/USD".to_string(),
            bid: 1.0,
            bid_qty: 1.0,
            ask: 2.0,
            ask_qty: 1.0,
            timestamp: None,
        };
        assert_eq!(ticker.into_quote(42).timestamp, 42);
    }

    #[test]
    fn test_trade_into_trade() {
        let (channel, data) = channel_data(TRADE_MESSAGE);
        assert_eq!(channel, "trade");

        let trades: Vec<KrakenTradeData> = serde_json::from_value(data).unwrap();
        let trade = trades[0].clone().into_trade().unwrap();
        assert_eq!(trade.id.as_deref(), Some("12345"));
        assert_eq!(trade.side, Some(Side::Buy));
        assert_eq!(trade.timestamp, 1_770_379_200_000);
        assert_eq!(trade.cost, 97.0);
    }

    #[test]
    fn test_string_trade_id_and_bad_timestamp() {
        let raw = r#"{"symbol":"BTC/USD","side":"sell","price":1.0,"qty":1.0,"trade_id":"abc","timestamp":"not a time"}"#;
        let trade: KrakenTradeData = serde_json::from_str(raw).unwrap();
        assert!(matches!(trade.trade_id, KrakenTradeId::Text(ref s) if s == "abc"));
        assert!(trade.into_trade().is_none());
    }

    #[test]
    fn test_instrument_snapshot_online_symbols() {
        let (channel, data) = channel_data(INSTRUMENT_SNAPSHOT);
        assert_eq!(channel, "instrument");

        let instruments: KrakenInstrumentData = serde_json::from_value(data).unwrap();
        assert_eq!(instruments.online_symbols(), vec!["BTC/USD", "ETH/USD"]);
    }

    #[test]
    fn test_parse_control_messages() {
        assert!(matches!(
            serde_json::from_str::<KrakenWsMessage>(HEARTBEAT_MESSAGE).unwrap(),
            KrakenWsMessage::Heartbeat { .. }
        ));
        assert!(matches!(
            serde_json::from_str::<KrakenWsMessage>(PONG_MESSAGE).unwrap(),
            KrakenWsMessage::Pong { .. }
        ));
        match serde_json::from_str::<KrakenWsMessage>(SUBSCRIBE_FAILED).unwrap() {
            KrakenWsMessage::SubscriptionResult {
                success,
                error,
                symbol,
                ..
            } => {
                assert!(!success);
                assert!(error.unwrap().contains("FOO/BAR"));
                assert_eq!(symbol.as_deref(), Some("FOO/BAR"));
            }
            other => panic!("Expected SubscriptionResult variant, got {:?}", other),
        }
    }
}
