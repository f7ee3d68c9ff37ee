use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("consumer rejected batch: {0}")]
    Rejected(String),
    #[error("consumer channel full")]
    ChannelFull,
    #[error("consumer channel closed")]
    ChannelClosed,
    #[error("consumer panicked: {0}")]
    Panicked(String),
}
