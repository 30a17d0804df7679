//! Query bundle passed through retrievers and engines

use serde::{Deserialize, Serialize};

use crate::node::filter::MetadataFilters;
use crate::node::Embedding;

/// A query with an optional precomputed embedding and metadata filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBundle {
    /// The query text
    pub query: String,

    /// Precomputed query embedding; retrievers embed the text when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,

    /// Metadata filters forwarded to the vector store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<MetadataFilters>,
}

impl QueryBundle {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            embedding: None,
            filters: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = Some(filters);
        self
    }
}

impl From<&str> for QueryBundle {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

impl From<String> for QueryBundle {
    fn from(query: String) -> Self {
        Self::new(query)
    }
}
