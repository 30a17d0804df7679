//! Error types for vector store operations

use thiserror::Error;

/// Result type for vector store operations
pub type Result<T> = std::result::Result<T, VectorError>;

/// Errors that can occur in vector stores
#[derive(Error, Debug)]
pub enum VectorError {
    /// Node passed to `add` without an embedding
    #[error("Node {0} has no embedding")]
    MissingEmbedding(String),

    /// Embedding length differs from the store's dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Filter operator not supported by this store
    #[error("Unsupported filter: {0}")]
    FilterUnsupported(String),

    /// Requested node id absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cancellation token tripped
    #[error("Operation canceled")]
    Canceled,

    /// Invariant violation
    #[error("Internal error: {0}")]
    Internal(String),

    /// Error from the core data model
    #[error("Core error: {0}")]
    Core(#[source] lodestone_core::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lodestone_core::Error> for VectorError {
    fn from(err: lodestone_core::Error) -> Self {
        match err {
            lodestone_core::Error::Canceled => VectorError::Canceled,
            lodestone_core::Error::Unsupported(msg) => VectorError::FilterUnsupported(msg),
            other => VectorError::Core(other),
        }
    }
}
