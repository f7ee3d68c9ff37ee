use mdstream_metadata::Pipeline;
use thiserror::Error;

/// Failures reported by a feed connection
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("loading markets failed: {0}")]
    LoadMarkets(String),
    #[error("markets not loaded")]
    MarketsNotLoaded,
    #[error("unsupported market type: {0}")]
    UnsupportedMarketType(String),
    #[error("subscription failed: {0}")]
    Subscribe(String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no connection factory for venue {venue} (broker {broker})")]
    UnknownVenue { broker: String, venue: String },
    #[error("creating connection failed: {0}")]
    Feed(#[from] FeedError),
}

/// Session-fatal failures: the session never reaches RUNNING
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{pipeline} session for {broker}: {source}")]
    Connect {
        broker: String,
        pipeline: Pipeline,
        #[source]
        source: RegistryError,
    },
    #[error("{pipeline} session for {broker}: {source}")]
    LoadMarkets {
        broker: String,
        pipeline: Pipeline,
        #[source]
        source: FeedError,
    },
    #[error("{pipeline} session for {broker}: {source}")]
    Symbols {
        broker: String,
        pipeline: Pipeline,
        #[source]
        source: FeedError,
    },
}
