//! In-memory vector store
//!
//! Exact cosine scan over a hash map. Supports the full filter operator
//! set. Intended for tests and small corpora; the HNSW store covers
//! larger ones.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::cancellation::ensure_active;
use lodestone_core::embedding::utils::cosine_similarity;
use lodestone_core::{Node, NodeWithScore};

use crate::error::{Result, VectorError};
use crate::store::{belongs_to_ref_doc, VectorStore};
use crate::types::VectorStoreQuery;

/// In-memory cosine vector store
pub struct MemoryVectorStore {
    nodes: Arc<RwLock<HashMap<String, Node>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored nodes
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Fetch a stored node by id
    pub async fn get(&self, id: &str) -> Option<Node> {
        self.nodes.read().await.get(id).cloned()
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryVectorStore {
    fn clone(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add(&self, ctx: &CancellationToken, nodes: &[Node]) -> Result<Vec<String>> {
        ensure_active(ctx)?;

        for node in nodes {
            match &node.embedding {
                Some(embedding) if !embedding.is_empty() => {}
                _ => return Err(VectorError::MissingEmbedding(node.id.clone())),
            }
        }

        let mut store = self.nodes.write().await;
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            ids.push(node.id.clone());
            store.insert(node.id.clone(), node.clone());
        }
        debug!(added = ids.len(), total = store.len(), "memory store add");
        Ok(ids)
    }

    async fn query(
        &self,
        ctx: &CancellationToken,
        query: &VectorStoreQuery,
    ) -> Result<Vec<NodeWithScore>> {
        ensure_active(ctx)?;

        if query.top_k == 0 {
            return Ok(Vec::new());
        }

        let store = self.nodes.read().await;
        let mut results: Vec<NodeWithScore> = Vec::new();
        for node in store.values() {
            if let Some(filters) = &query.filters {
                if !filters.matches(&node.metadata)? {
                    continue;
                }
            }
            let embedding = match &node.embedding {
                Some(e) => e,
                None => continue,
            };
            let score = cosine_similarity(&query.embedding, embedding);
            results.push(NodeWithScore::new(node.clone(), score));
        }

        lodestone_core::node::sort_by_score_desc(&mut results);
        results.truncate(query.top_k);
        Ok(results)
    }

    async fn delete(&self, ctx: &CancellationToken, ref_doc_id: &str) -> Result<()> {
        ensure_active(ctx)?;

        let mut store = self.nodes.write().await;
        let before = store.len();
        store.retain(|_, node| !belongs_to_ref_doc(node, ref_doc_id));
        debug!(
            ref_doc_id,
            removed = before - store.len(),
            "memory store delete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::{MetadataFilter, MetadataFilters, NodeRelationship};

    fn embedded_node(id: &str, text: &str, embedding: Vec<f32>) -> Node {
        Node::with_id(id, text).with_embedding(embedding)
    }

    #[tokio::test]
    async fn test_add_requires_embedding() {
        let store = MemoryVectorStore::new();
        let ctx = CancellationToken::new();

        let bare = Node::with_id("n1", "no embedding");
        let err = store.add(&ctx, &[bare]).await.unwrap_err();
        assert!(matches!(err, VectorError::MissingEmbedding(_)));
    }

    #[tokio::test]
    async fn test_query_ranks_by_cosine() {
        let store = MemoryVectorStore::new();
        let ctx = CancellationToken::new();

        store
            .add(
                &ctx,
                &[
                    embedded_node("a", "a", vec![1.0, 0.0]),
                    embedded_node("b", "b", vec![0.0, 1.0]),
                    embedded_node("c", "c", vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let results = store
            .query(&ctx, &VectorStoreQuery::new(vec![1.0, 0.0], 2))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node.id, "a");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[1].node.id, "c");
    }

    #[tokio::test]
    async fn test_query_top_k_zero_is_empty() {
        let store = MemoryVectorStore::new();
        let ctx = CancellationToken::new();
        store
            .add(&ctx, &[embedded_node("a", "a", vec![1.0])])
            .await
            .unwrap();

        let results = store
            .query(&ctx, &VectorStoreQuery::new(vec![1.0], 0))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_query_applies_filters() {
        let store = MemoryVectorStore::new();
        let ctx = CancellationToken::new();
        store
            .add(
                &ctx,
                &[
                    embedded_node("a", "a", vec![1.0, 0.0]).with_metadata("lang", "en"),
                    embedded_node("b", "b", vec![1.0, 0.0]).with_metadata("lang", "fr"),
                ],
            )
            .await
            .unwrap();

        let query = VectorStoreQuery::new(vec![1.0, 0.0], 10)
            .with_filters(MetadataFilters::all(vec![MetadataFilter::eq("lang", "fr")]));
        let results = store.query(&ctx, &query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node.id, "b");
    }

    #[tokio::test]
    async fn test_add_replaces_by_id() {
        let store = MemoryVectorStore::new();
        let ctx = CancellationToken::new();

        store
            .add(&ctx, &[embedded_node("a", "v1", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .add(&ctx, &[embedded_node("a", "v2", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("a").await.unwrap().text, "v2");
    }

    #[tokio::test]
    async fn test_delete_by_ref_doc() {
        let store = MemoryVectorStore::new();
        let ctx = CancellationToken::new();

        let doc = Node::document("d1", "doc");
        let mut chunk = embedded_node("d1:0", "chunk", vec![1.0]);
        chunk.set_relationship(NodeRelationship::Source, doc.as_related_node_info());
        let standalone = embedded_node("solo", "solo", vec![1.0]);

        store.add(&ctx, &[chunk, standalone]).await.unwrap();
        store.delete(&ctx, "d1").await.unwrap();

        assert_eq!(store.len().await, 1);
        assert!(store.get("solo").await.is_some());

        // A node without a source relationship is matched by its own id
        store.delete(&ctx, "solo").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_canceled_query() {
        let store = MemoryVectorStore::new();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = store
            .query(&ctx, &VectorStoreQuery::new(vec![1.0], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::Canceled));
    }
}
