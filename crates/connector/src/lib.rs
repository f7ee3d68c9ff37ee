//! mdstream-connector: Streaming aggregation and dedup engine
//!
//! Runs one session per broker and pipeline (trades, bids/asks). Each session
//! subscribes its symbol universe in batches, polls the connection's caches
//! on a short fixed period and hands only newly arrived records to the
//! downstream consumer.

pub mod batcher;
pub mod broker;
pub mod cache;
pub mod context;
pub mod emitter;
pub mod error;
pub mod extract;
pub mod kraken;
pub mod memory;
pub mod metrics;
pub mod poller;
pub mod record;
pub mod refresher;
pub mod registry;
pub mod reporter;
pub mod server;
pub mod session;
pub mod traits;

pub use batcher::{batches, BatchSize};
pub use broker::DataBroker;
pub use cache::{FeedCaches, TradeCache, DEFAULT_TRADES_LIMIT};
pub use context::{EngineContext, Timings};
pub use emitter::{EmitOutcome, Emitter};
pub use error::{FeedError, RegistryError, SessionError};
pub use extract::{DiffExtractor, QuoteDiffExtractor, TradeDiffExtractor};
pub use kraken::KrakenVenue;
pub use memory::InMemoryVenue;
pub use poller::{Poller, TickOutcome};
pub use record::{Quote, Side, Trade};
pub use refresher::SubscriptionRefresher;
pub use registry::ConnectionRegistry;
pub use reporter::{MetricsReporter, SessionCounters};
pub use server::{create_router, run_server, ServerState};
pub use session::{connection_id, Session, SessionState};
pub use traits::{ConnectionFactory, ConnectionRequest, FeedConnection};
