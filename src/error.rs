use std::sync::Arc;
use thiserror::Error;

/// Unified error type for the whole backend
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    // IO errors
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    // KV store errors
    #[error("key not found")]
    KeyNotFound,
    #[error("store error: {0}")]
    Store(String),

    // Decoding errors
    #[error("serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    InvalidConfig(String),
    #[error("unsupported KV backend: {0}")]
    UnsupportedBackend(String),

    // Frontend protocol errors
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Store(err.to_string())
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, BackendError>;
