//! Kraken spot venue over the public v2 WebSocket API

pub mod connection;
pub mod messages;
pub mod websocket;

pub use connection::{KrakenConnection, KrakenVenue};
pub use messages::KrakenWsMessage;
pub use websocket::{KrakenWebSocket, KrakenWebSocketError, KRAKEN_WS_URL};
