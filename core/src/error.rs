/// Error types for the messaging core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("History unavailable: {0}")]
    HistoryUnavailable(String),

    #[error("Session changed while request was in flight")]
    SessionChanged,

    #[error("API error: {0}")]
    Api(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Channel not ready")]
    ChannelNotReady,
}

pub type Result<T> = std::result::Result<T, ChatError>;
