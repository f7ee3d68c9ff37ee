//! In-memory implementations for testing
pub mod consumer;

pub use consumer::{FailureMode, RecordingConsumer};
