//! Vector store retriever

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::embedding::EmbeddingModel;
use lodestone_core::{NodeWithScore, QueryBundle};
use lodestone_vector::{VectorStore, VectorStoreQuery};

use crate::error::Result;
use crate::retriever::Retriever;

/// Retriever issuing similarity queries against a single vector store
pub struct VectorRetriever {
    store: Arc<dyn VectorStore>,
    embed_model: Arc<dyn EmbeddingModel>,
    similarity_top_k: usize,
}

impl VectorRetriever {
    /// Default number of results
    pub const DEFAULT_TOP_K: usize = 4;

    pub fn new(
        store: Arc<dyn VectorStore>,
        embed_model: Arc<dyn EmbeddingModel>,
        similarity_top_k: usize,
    ) -> Self {
        Self {
            store,
            embed_model,
            similarity_top_k,
        }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
    ) -> Result<Vec<NodeWithScore>> {
        let embedding = match &query.embedding {
            Some(embedding) => embedding.clone(),
            None => {
                self.embed_model
                    .get_query_embedding(ctx, &query.query)
                    .await?
            }
        };

        let mut store_query = VectorStoreQuery::new(embedding, self.similarity_top_k);
        if let Some(filters) = &query.filters {
            store_query = store_query.with_filters(filters.clone());
        }

        let results = self.store.query(ctx, &store_query).await?;
        debug!(query = %query.query, results = results.len(), "vector retrieval");
        Ok(results)
    }
}
