//! Error types for vigil-core

use thiserror::Error;

/// Main error type for the vigil-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML export error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A wire frame could not be turned into an event
    #[error("decode error: {0}")]
    Decode(String),

    /// A compressed stream chunk could not be inflated
    #[error("decompression error: {0}")]
    Decompress(String),

    /// Streaming connection error
    #[error("transport error: {0}")]
    Transport(String),

    /// Run command (start/stop) error
    #[error("command error: {0}")]
    Command(String),
}

/// Result type alias for vigil-core
pub type Result<T> = std::result::Result<T, Error>;
