use thiserror::Error;

/// Errors raised by the memory engine
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Empty or malformed content handed to `add_memory`
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Similarity method name not in the registry
    #[error("Unknown similarity method: {0}")]
    UnknownMethod(String),

    /// Backing file could not be read or written
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// External embedding service failed or returned garbage
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("{0}")]
    NotInitialized(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
