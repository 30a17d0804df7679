//! # Lodestone Core
//!
//! Shared foundation of the Lodestone RAG framework: the node data model
//! with its relationship graph, metadata filters, the language-model and
//! embedding-model interfaces (with deterministic mocks for tests), the
//! workspace error type, and cancellation helpers.

pub mod cancellation;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod node;

pub use error::{Error, Result};
pub use node::{
    Document, Embedding, FilterCondition, FilterOperator, Metadata, MetadataFilter,
    MetadataFilters, MetadataMode, MetadataValue, Node, NodeRelationship, NodeType, NodeWithScore,
    QueryBundle, RelatedNodeInfo,
};
