use std::path::PathBuf;

use thiserror::Error;

/// All errors produced by hotword-core.
#[derive(Debug, Error)]
pub enum HotwordError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("acoustic model not found: {path}")]
    AcousticModelNotFound { path: PathBuf },

    #[error("missing pronunciations for words: {}", words.join(", "))]
    MissingPronunciations { words: Vec<String> },

    #[error("malformed audio chunk: {0}")]
    Format(String),

    #[error("decoder error: {0}")]
    Decoder(String),

    #[error("socket error on {addr}: {source}")]
    Socket {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("audio queue disconnected, detection loop is gone")]
    QueueDisconnected,

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HotwordError>;
