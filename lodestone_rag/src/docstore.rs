//! Document store
//!
//! Identity-and-hash map backing deduplication and node lookups. The hash
//! index tracks ref-doc content hashes; node storage holds the chunk
//! nodes themselves, so retrievers can fetch neighbors and parents by id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::cancellation::ensure_active;
use lodestone_core::Node;

use crate::error::Result;

/// Storage contract for documents and nodes
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Content hash recorded for a ref-doc id, if any
    async fn get_document_hash(&self, ctx: &CancellationToken, id: &str) -> Result<Option<String>>;

    /// Record the content hash for a ref-doc id
    async fn set_document_hash(&self, ctx: &CancellationToken, id: &str, hash: &str) -> Result<()>;

    /// Every recorded `id -> hash` pair
    async fn all_document_hashes(
        &self,
        ctx: &CancellationToken,
    ) -> Result<HashMap<String, String>>;

    /// Store nodes by id, replacing existing entries
    async fn add_documents(&self, ctx: &CancellationToken, nodes: &[Node]) -> Result<()>;

    /// Fetch a stored node by id
    async fn get_document(&self, ctx: &CancellationToken, id: &str) -> Result<Option<Node>>;

    /// Remove a single stored node
    async fn delete_document(&self, ctx: &CancellationToken, id: &str) -> Result<()>;

    /// Remove a ref-doc: its hash entry and every node whose source (or
    /// own id, for nodes without one) matches
    async fn delete_ref_doc(&self, ctx: &CancellationToken, ref_doc_id: &str) -> Result<()>;
}

/// In-memory document store
pub struct InMemoryDocumentStore {
    nodes: Arc<RwLock<HashMap<String, Node>>>,
    hashes: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            hashes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored nodes
    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Number of ref-docs in the hash index
    pub async fn ref_doc_count(&self) -> usize {
        self.hashes.read().await.len()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryDocumentStore {
    fn clone(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
            hashes: Arc::clone(&self.hashes),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document_hash(&self, ctx: &CancellationToken, id: &str) -> Result<Option<String>> {
        ensure_active(ctx)?;
        Ok(self.hashes.read().await.get(id).cloned())
    }

    async fn set_document_hash(&self, ctx: &CancellationToken, id: &str, hash: &str) -> Result<()> {
        ensure_active(ctx)?;
        self.hashes
            .write()
            .await
            .insert(id.to_string(), hash.to_string());
        Ok(())
    }

    async fn all_document_hashes(
        &self,
        ctx: &CancellationToken,
    ) -> Result<HashMap<String, String>> {
        ensure_active(ctx)?;
        Ok(self.hashes.read().await.clone())
    }

    async fn add_documents(&self, ctx: &CancellationToken, nodes: &[Node]) -> Result<()> {
        ensure_active(ctx)?;
        let mut store = self.nodes.write().await;
        for node in nodes {
            store.insert(node.id.clone(), node.clone());
        }
        Ok(())
    }

    async fn get_document(&self, ctx: &CancellationToken, id: &str) -> Result<Option<Node>> {
        ensure_active(ctx)?;
        Ok(self.nodes.read().await.get(id).cloned())
    }

    async fn delete_document(&self, ctx: &CancellationToken, id: &str) -> Result<()> {
        ensure_active(ctx)?;
        self.nodes.write().await.remove(id);
        Ok(())
    }

    async fn delete_ref_doc(&self, ctx: &CancellationToken, ref_doc_id: &str) -> Result<()> {
        ensure_active(ctx)?;
        self.hashes.write().await.remove(ref_doc_id);
        let mut nodes = self.nodes.write().await;
        let before = nodes.len();
        nodes.retain(|_, node| match node.ref_doc_id() {
            Some(source) => source != ref_doc_id,
            None => node.id != ref_doc_id,
        });
        debug!(
            ref_doc_id,
            removed = before - nodes.len(),
            "docstore delete_ref_doc"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::NodeRelationship;

    #[tokio::test]
    async fn test_hash_index() {
        let store = InMemoryDocumentStore::new();
        let ctx = CancellationToken::new();

        assert!(store.get_document_hash(&ctx, "d1").await.unwrap().is_none());
        store.set_document_hash(&ctx, "d1", "abc").await.unwrap();
        assert_eq!(
            store.get_document_hash(&ctx, "d1").await.unwrap().as_deref(),
            Some("abc")
        );

        store.set_document_hash(&ctx, "d2", "def").await.unwrap();
        let all = store.all_document_hashes(&ctx).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["d2"], "def");
    }

    #[tokio::test]
    async fn test_add_get_delete_nodes() {
        let store = InMemoryDocumentStore::new();
        let ctx = CancellationToken::new();

        let node = Node::with_id("n1", "text");
        store.add_documents(&ctx, &[node.clone()]).await.unwrap();
        assert_eq!(store.get_document(&ctx, "n1").await.unwrap(), Some(node));

        store.delete_document(&ctx, "n1").await.unwrap();
        assert!(store.get_document(&ctx, "n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_ref_doc_removes_chunks_and_hash() {
        let store = InMemoryDocumentStore::new();
        let ctx = CancellationToken::new();

        let doc = Node::document("d1", "full");
        let mut chunk_a = Node::with_id("d1:0", "fu");
        chunk_a.set_relationship(NodeRelationship::Source, doc.as_related_node_info());
        let mut chunk_b = Node::with_id("d1:1", "ll");
        chunk_b.set_relationship(NodeRelationship::Source, doc.as_related_node_info());
        let other = Node::with_id("x", "other");

        store.set_document_hash(&ctx, "d1", &doc.hash()).await.unwrap();
        store
            .add_documents(&ctx, &[chunk_a, chunk_b, other])
            .await
            .unwrap();

        store.delete_ref_doc(&ctx, "d1").await.unwrap();
        assert_eq!(store.node_count().await, 1);
        assert!(store.get_document(&ctx, "x").await.unwrap().is_some());
        assert!(store.get_document_hash(&ctx, "d1").await.unwrap().is_none());
    }
}
