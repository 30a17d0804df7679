//! Error types for the RAG pipeline

use thiserror::Error;

use lodestone_vector::VectorError;

/// Result type for RAG operations
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur in the RAG pipeline
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid combination of options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Requested document or node id absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error crossing the retrieval boundary of the query engine
    #[error("Retrieval error: {0}")]
    Retrieve(#[source] Box<RagError>),

    /// Error crossing the synthesis boundary of the query engine
    #[error("Synthesis error: {0}")]
    Synthesize(#[source] Box<RagError>),

    /// Cancellation token tripped
    #[error("Operation canceled")]
    Canceled,

    /// Invariant violation
    #[error("Internal error: {0}")]
    Internal(String),

    /// Error from the core data model or a model provider
    #[error("Core error: {0}")]
    Core(#[source] lodestone_core::Error),

    /// Error from a vector store
    #[error("Vector store error: {0}")]
    Vector(#[source] VectorError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lodestone_core::Error> for RagError {
    fn from(err: lodestone_core::Error) -> Self {
        match err {
            lodestone_core::Error::Canceled => RagError::Canceled,
            lodestone_core::Error::Configuration(msg) => RagError::Configuration(msg),
            lodestone_core::Error::NotFound(msg) => RagError::NotFound(msg),
            other => RagError::Core(other),
        }
    }
}

impl From<VectorError> for RagError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::Canceled => RagError::Canceled,
            VectorError::NotFound(msg) => RagError::NotFound(msg),
            other => RagError::Vector(other),
        }
    }
}
