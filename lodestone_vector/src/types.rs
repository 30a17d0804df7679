//! Query types for vector stores

use lodestone_core::{Embedding, MetadataFilters};

/// A similarity query against a vector store
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStoreQuery {
    /// Query embedding
    pub embedding: Embedding,

    /// Maximum number of results
    pub top_k: usize,

    /// Metadata filters applied before ranking
    pub filters: Option<MetadataFilters>,
}

impl VectorStoreQuery {
    pub fn new(embedding: Embedding, top_k: usize) -> Self {
        Self {
            embedding,
            top_k,
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = Some(filters);
        self
    }
}
