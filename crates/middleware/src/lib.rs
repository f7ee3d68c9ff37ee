//! mdstream-middleware: Downstream consumer abstractions
//!
//! The engine hands every non-empty batch of new records to a [`Consumer`].
//! Provides channel, logging and in-memory implementations plus the TSC
//! clock used for tick timing.

pub mod channel;
pub mod consumer;
pub mod error;
pub mod latency;
pub mod memory;

pub use channel::ChannelConsumer;
pub use consumer::{Consumer, ConsumerMessage, DiscardConsumer, LogConsumer};
pub use error::ConsumerError;
pub use latency::{now_tsc, CLOCK};
