//! Kraken venue
//!
//! One WebSocket per connection, owned by a reader task. The connection
//! talks to the reader through a command channel; trade and ticker updates
//! are written straight into the connection's caches. Markets come from the
//! `instrument` channel snapshot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::cache::FeedCaches;
use crate::error::FeedError;
use crate::kraken::messages::{
    KrakenInstrumentData, KrakenTickerData, KrakenTradeData, KrakenWsMessage,
};
use crate::kraken::websocket::{KrakenWebSocket, KRAKEN_WS_URL};
use crate::traits::{ConnectionFactory, ConnectionRequest, FeedConnection};

const SPOT: &str = "spot";
const TRADE_CHANNEL: &str = "trade";
const TICKER_CHANNEL: &str = "ticker";
const COMMAND_BUFFER: usize = 64;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const MARKETS_TIMEOUT: Duration = Duration::from_secs(30);
const RECONNECT_MAX_ATTEMPTS: u32 = 10;
const RECONNECT_MAX_BACKOFF_MS: u64 = 30_000;

/// Factory for Kraken spot connections
pub struct KrakenVenue {
    ws_url: String,
}

impl KrakenVenue {
    pub fn new() -> Self {
        Self::with_url(KRAKEN_WS_URL)
    }

    pub fn with_url(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }
}

impl Default for KrakenVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFactory for KrakenVenue {
    async fn create(&self, request: &ConnectionRequest) -> Result<Arc<dyn FeedConnection>, FeedError> {
        let connection = KrakenConnection::connect(&self.ws_url, request).await?;
        Ok(Arc::new(connection))
    }
}

enum Command {
    Subscribe {
        params: serde_json::Value,
        ack: oneshot::Sender<Result<(), FeedError>>,
    },
    LoadInstruments {
        ack: oneshot::Sender<Result<(), FeedError>>,
    },
}

/// State shared between a connection and its reader task
#[derive(Default)]
struct Shared {
    caches: FeedCaches,
    markets: RwLock<Option<Vec<String>>>,
    /// (channel, symbol) pairs requested on the current socket
    subscribed: Mutex<HashSet<(&'static str, String)>>,
}

impl Shared {
    fn markets_loaded(&self) -> bool {
        self.markets.read().map(|m| m.is_some()).unwrap_or(false)
    }

    /// Symbols of `symbols` not yet requested on `channel`
    fn unsubscribed(&self, channel: &'static str, symbols: &[String]) -> Vec<String> {
        let Ok(subscribed) = self.subscribed.lock() else {
            return symbols.to_vec();
        };
        symbols
            .iter()
            .filter(|s| !subscribed.contains(&(channel, (*s).clone())))
            .cloned()
            .collect()
    }

    fn mark_subscribed(&self, channel: &'static str, symbols: &[String]) {
        if let Ok(mut subscribed) = self.subscribed.lock() {
            subscribed.extend(symbols.iter().map(|s| (channel, s.clone())));
        }
    }

    fn unmark_subscribed(&self, channel: &'static str, symbols: &[String]) {
        if let Ok(mut subscribed) = self.subscribed.lock() {
            for symbol in symbols {
                subscribed.remove(&(channel, symbol.clone()));
            }
        }
    }

    /// Drop a rejected symbol from every channel so the next refresh retries it
    fn forget_symbol(&self, symbol: &str) {
        if let Ok(mut subscribed) = self.subscribed.lock() {
            subscribed.retain(|(_, s)| s != symbol);
        }
    }

    fn clear_subscriptions(&self) {
        if let Ok(mut subscribed) = self.subscribed.lock() {
            subscribed.clear();
        }
    }

    /// Apply one message; returns true when it delivered the instrument snapshot
    fn apply(&self, id: &str, msg: KrakenWsMessage, now_ms: i64) -> bool {
        match msg {
            KrakenWsMessage::ChannelMessage {
                channel,
                msg_type,
                data,
            } => match channel.as_str() {
                TRADE_CHANNEL => {
                    match serde_json::from_value::<Vec<KrakenTradeData>>(data) {
                        Ok(trades) => {
                            for trade in trades.into_iter().filter_map(KrakenTradeData::into_trade) {
                                self.caches.append_trade(trade);
                            }
                        }
                        Err(e) => warn!(connection = %id, error = %e, "Failed to parse Kraken trades"),
                    }
                    false
                }
                TICKER_CHANNEL => {
                    match serde_json::from_value::<Vec<KrakenTickerData>>(data) {
                        Ok(tickers) => {
                            for ticker in tickers {
                                self.caches.set_quote(ticker.into_quote(now_ms));
                            }
                        }
                        Err(e) => warn!(connection = %id, error = %e, "Failed to parse Kraken ticker"),
                    }
                    false
                }
                "instrument" if msg_type == "snapshot" => {
                    match serde_json::from_value::<KrakenInstrumentData>(data) {
                        Ok(instruments) => {
                            let symbols = instruments.online_symbols();
                            info!(connection = %id, markets = symbols.len(), "Kraken markets loaded");
                            if let Ok(mut markets) = self.markets.write() {
                                *markets = Some(symbols);
                            }
                            true
                        }
                        Err(e) => {
                            warn!(connection = %id, error = %e, "Failed to parse Kraken instruments");
                            false
                        }
                    }
                }
                _ => {
                    trace!(connection = %id, channel = %channel, "Ignoring Kraken channel message");
                    false
                }
            },
            KrakenWsMessage::SubscriptionResult {
                success: false,
                error,
                symbol,
                ..
            } => {
                warn!(connection = %id, symbol = ?symbol, error = ?error, "Kraken subscription rejected");
                if let Some(symbol) = symbol {
                    self.forget_symbol(&symbol);
                }
                false
            }
            KrakenWsMessage::SubscriptionResult { .. } => {
                debug!(connection = %id, "Kraken subscription confirmed");
                false
            }
            KrakenWsMessage::Pong { .. } | KrakenWsMessage::Heartbeat { .. } => false,
        }
    }
}

pub struct KrakenConnection {
    id: String,
    new_updates: bool,
    commands: mpsc::Sender<Command>,
    shared: Arc<Shared>,
}

impl KrakenConnection {
    async fn connect(url: &str, request: &ConnectionRequest) -> Result<Self, FeedError> {
        let ws = KrakenWebSocket::connect(url)
            .await
            .map_err(|e| FeedError::ConnectionFailed(format!("{}: {}", request.connection_id, e)))?;

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let shared = Arc::new(Shared::default());
        let reader = Reader {
            id: request.connection_id.clone(),
            url: url.to_string(),
            ws,
            commands: rx,
            shared: Arc::clone(&shared),
            pending_markets: Vec::new(),
        };
        tokio::spawn(reader.run());

        Ok(Self {
            id: request.connection_id.clone(),
            new_updates: request.new_updates,
            commands: tx,
            shared,
        })
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), FeedError>>) -> Command,
    ) -> Result<(), FeedError> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(command(ack))
            .await
            .map_err(|_| FeedError::ConnectionFailed(format!("{}: reader stopped", self.id)))?;
        rx.await
            .map_err(|_| FeedError::ConnectionFailed(format!("{}: reader stopped", self.id)))?
    }

    async fn subscribe(
        &self,
        channel: &'static str,
        symbols: &[String],
        params: impl FnOnce(&[String]) -> serde_json::Value,
    ) -> Result<(), FeedError> {
        let fresh = self.shared.unsubscribed(channel, symbols);
        if fresh.is_empty() {
            return Ok(());
        }
        let params = params(&fresh);
        // Marked before sending so a fast rejection is not overwritten
        self.shared.mark_subscribed(channel, &fresh);
        let result = self.request(|ack| Command::Subscribe { params, ack }).await;
        if result.is_err() {
            self.shared.unmark_subscribed(channel, &fresh);
        }
        result
    }
}

#[async_trait]
impl FeedConnection for KrakenConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load_markets(&self) -> Result<(), FeedError> {
        if self.shared.markets_loaded() {
            return Ok(());
        }
        timeout(
            MARKETS_TIMEOUT,
            self.request(|ack| Command::LoadInstruments { ack }),
        )
        .await
        .map_err(|_| FeedError::LoadMarkets(format!("{}: instrument snapshot timed out", self.id)))?
    }

    fn symbols_for_market_type(&self, market_type: &str) -> Result<Vec<String>, FeedError> {
        if market_type != SPOT {
            return Err(FeedError::UnsupportedMarketType(market_type.to_string()));
        }
        self.shared
            .markets
            .read()
            .ok()
            .and_then(|m| m.clone())
            .ok_or(FeedError::MarketsNotLoaded)
    }

    async fn watch_trades_for_symbols(&self, symbols: &[String]) -> Result<(), FeedError> {
        let snapshot = !self.new_updates;
        self.subscribe(TRADE_CHANNEL, symbols, |fresh| {
            serde_json::json!({
                "channel": TRADE_CHANNEL,
                "symbol": fresh,
                "snapshot": snapshot,
            })
        })
        .await
    }

    async fn watch_bids_asks(&self, symbols: &[String]) -> Result<(), FeedError> {
        self.subscribe(TICKER_CHANNEL, symbols, |fresh| {
            serde_json::json!({
                "channel": TICKER_CHANNEL,
                "symbol": fresh,
                "event_trigger": "bbo",
                "snapshot": true,
            })
        })
        .await
    }

    fn caches(&self) -> &FeedCaches {
        &self.shared.caches
    }
}

/// Owns the socket; exits when the connection is dropped or reconnects give up
struct Reader {
    id: String,
    url: String,
    ws: KrakenWebSocket,
    commands: mpsc::Receiver<Command>,
    shared: Arc<Shared>,
    pending_markets: Vec<oneshot::Sender<Result<(), FeedError>>>,
}

impl Reader {
    async fn run(mut self) {
        let mut ping_interval = interval(PING_INTERVAL);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!(connection = %self.id, "Connection dropped, stopping Kraken reader");
                        break;
                    };
                    if !self.handle(command).await && !self.reconnect().await {
                        return;
                    }
                }

                _ = ping_interval.tick() => {
                    trace!(connection = %self.id, "Sending Kraken app-level ping");
                    if let Err(e) = self.ws.ping().await {
                        warn!(connection = %self.id, error = %e, "Failed to send Kraken ping");
                        if !self.reconnect().await {
                            return;
                        }
                    }
                }

                result = self.ws.recv_raw() => {
                    match result {
                        Ok((_, msg)) => {
                            let now_ms = Utc::now().timestamp_millis();
                            if self.shared.apply(&self.id, msg, now_ms) {
                                for ack in self.pending_markets.drain(..) {
                                    let _ = ack.send(Ok(()));
                                }
                            }
                        }
                        Err(e) => {
                            warn!(connection = %self.id, error = %e, "Kraken WebSocket error");
                            if !self.reconnect().await {
                                return;
                            }
                        }
                    }
                }
            }
        }

        if let Err(e) = self.ws.close().await {
            debug!(connection = %self.id, error = %e, "Error closing Kraken WebSocket");
        }
    }

    /// Returns false when the socket failed and needs reconnecting
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Subscribe { params, ack } => match self.ws.subscribe(params).await {
                Ok(()) => {
                    let _ = ack.send(Ok(()));
                    true
                }
                Err(e) => {
                    let _ = ack.send(Err(FeedError::Subscribe(e.to_string())));
                    false
                }
            },
            Command::LoadInstruments { ack } => {
                if self.shared.markets_loaded() {
                    let _ = ack.send(Ok(()));
                    return true;
                }
                self.pending_markets.push(ack);
                self.request_instruments().await
            }
        }
    }

    async fn request_instruments(&mut self) -> bool {
        let params = serde_json::json!({"channel": "instrument", "snapshot": true});
        match self.ws.subscribe(params).await {
            Ok(()) => true,
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Failed to request Kraken instruments");
                false
            }
        }
    }

    /// Reconnect with capped exponential backoff and jitter. Subscriptions
    /// are forgotten so the next refresh re-sends them on the new socket.
    async fn reconnect(&mut self) -> bool {
        self.shared.clear_subscriptions();

        for attempt in 0..RECONNECT_MAX_ATTEMPTS {
            let backoff_ms = (1000u64 << attempt.min(5)).min(RECONNECT_MAX_BACKOFF_MS);
            let delay = Duration::from_millis(backoff_ms + rand::random::<u64>() % 1000);
            sleep(delay).await;

            match KrakenWebSocket::connect(&self.url).await {
                Ok(ws) => {
                    self.ws = ws;
                    info!(connection = %self.id, attempt, "Kraken WebSocket reconnected");
                    if !self.pending_markets.is_empty() && !self.request_instruments().await {
                        continue;
                    }
                    return true;
                }
                Err(e) => {
                    warn!(connection = %self.id, attempt, error = %e, "Kraken reconnect failed");
                }
            }
        }

        error!(connection = %self.id, attempts = RECONNECT_MAX_ATTEMPTS, "Giving up on Kraken connection");
        for ack in self.pending_markets.drain(..) {
            let _ = ack.send(Err(FeedError::LoadMarkets(format!("{}: connection lost", self.id))));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> KrakenWsMessage {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_apply_trades_append_to_cache() {
        let shared = Shared::default();
        let msg = parse(
            r#"{"channel":"trade","type":"update","data":[
                {"symbol":"BTC/USD","side":"buy","price":100.0,"qty":1.0,"ord_type":"limit","trade_id":1,"timestamp":"2026-02-06T12:00:00.000000Z"},
                {"symbol":"BTC/USD","side":"sell","price":101.0,"qty":2.0,"ord_type":"market","trade_id":2,"timestamp":"2026-02-06T12:00:00.100000Z"}
            ]}"#,
        );

        assert!(!shared.apply("k", msg, 0));

        let ids = shared
            .caches
            .with_trades("BTC/USD", |cache| {
                cache
                    .iter_from(0)
                    .filter_map(|t| t.id.clone())
                    .collect::<Vec<_>>()
            })
            .unwrap();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_apply_ticker_replaces_quote() {
        let shared = Shared::default();
        let raw = r#"{"channel":"ticker","type":"update","data":[{"symbol":"ETH/USD","bid":10.0,"bid_qty":1.0,"ask":11.0,"ask_qty":2.0}]}"#;

        shared.apply("k", parse(raw), 5);
        let first = shared.caches.quote("ETH/USD").unwrap();
        shared.apply("k", parse(raw), 5);
        let second = shared.caches.quote("ETH/USD").unwrap();

        assert_eq!(first.timestamp, 5);
        assert_eq!(*first, *second);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_apply_instrument_snapshot_loads_markets() {
        let shared = Shared::default();
        assert!(!shared.markets_loaded());

        let loaded = shared.apply(
            "k",
            parse(r#"{"channel":"instrument","type":"snapshot","data":{"pairs":[{"symbol":"BTC/USD","status":"online"},{"symbol":"OLD/USD","status":"delisted"}]}}"#),
            0,
        );

        assert!(loaded);
        assert_eq!(
            shared.markets.read().unwrap().clone(),
            Some(vec!["BTC/USD".to_string()])
        );
    }

    #[test]
    fn test_subscription_tracking() {
        let shared = Shared::default();
        let symbols = vec!["BTC/USD".to_string(), "ETH/USD".to_string()];

        shared.mark_subscribed(TRADE_CHANNEL, &symbols[..1]);
        assert_eq!(shared.unsubscribed(TRADE_CHANNEL, &symbols), vec!["ETH/USD"]);
        assert_eq!(shared.unsubscribed(TICKER_CHANNEL, &symbols).len(), 2);

        shared.clear_subscriptions();
        assert_eq!(shared.unsubscribed(TRADE_CHANNEL, &symbols).len(), 2);
    }

    #[test]
    fn test_rejected_subscription_is_retried() {
        let shared = Shared::default();
        let symbols = vec!["BTC/USD".to_string(), "ETH/USD".to_string()];
        shared.mark_subscribed(TRADE_CHANNEL, &symbols);

        let rejected = parse(
            r#"{"method":"subscribe","success":false,"error":"Exceeded msg rate","symbol":"BTC/USD","time_in":"2026-02-06T12:00:00.000000Z","time_out":"2026-02-06T12:00:00.000100Z"}"#,
        );
        assert!(!shared.apply("k", rejected, 0));

        assert_eq!(shared.unsubscribed(TRADE_CHANNEL, &symbols), vec!["BTC/USD"]);
    }

    #[test]
    fn test_rejection_without_symbol_keeps_subscriptions() {
        let shared = Shared::default();
        let symbols = vec!["BTC/USD".to_string()];
        shared.mark_subscribed(TICKER_CHANNEL, &symbols);

        shared.apply(
            "k",
            parse(r#"{"method":"subscribe","success":false,"error":"Internal error"}"#),
            0,
        );

        assert!(shared.unsubscribed(TICKER_CHANNEL, &symbols).is_empty());
    }

    #[test]
    fn test_unmark_subscribed() {
        let shared = Shared::default();
        let symbols = vec!["BTC/USD".to_string(), "ETH/USD".to_string()];
        shared.mark_subscribed(TRADE_CHANNEL, &symbols);
        shared.unmark_subscribed(TRADE_CHANNEL, &symbols[1..]);

        assert_eq!(shared.unsubscribed(TRADE_CHANNEL, &symbols), vec!["ETH/USD"]);
    }

    #[test]
    fn test_venue_default_url() {
        assert_eq!(KrakenVenue::default().ws_url, KRAKEN_WS_URL);
        assert_eq!(KrakenVenue::with_url("ws://localhost:1").ws_url, "ws://localhost:1");
    }
}
