//! Error types shared across the Lodestone workspace

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the core data model and model providers
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid combination of options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Requested document or node id is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Embedding or LLM call failed; carries the provider's message
    #[error("Provider error: {0}")]
    Provider(String),

    /// Operation not supported by this component
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Cancellation token tripped
    #[error("Operation canceled")]
    Canceled,

    /// Invariant violation
    #[error("Internal error: {0}")]
    Internal(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
