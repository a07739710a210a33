//! Error types for the cache facade
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type shared by every cache adapter.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backend prerequisites missing at construction time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Key is empty or of an unsupported type
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Transport could not be established
    #[error("Could not connect with cache server. Error number: {code} with message \"{message}\"")]
    Connection { code: i32, message: String },

    /// Error reply sent by the server
    #[error("Server error: {0}")]
    Server(String),

    /// Malformed or unexpected reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Filesystem or socket failure outside connection setup
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// True for failures raised while talking to the network backend.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            CacheError::Connection { .. } | CacheError::Server(_) | CacheError::Protocol(_)
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache facade.
pub type Result<T> = std::result::Result<T, CacheError>;
