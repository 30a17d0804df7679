//! The vector store contract and reference implementations

pub mod hnsw;
pub mod memory;

pub use hnsw::{HnswConfig, HnswVectorStore};
pub use memory::MemoryVectorStore;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lodestone_core::{Node, NodeWithScore};

use crate::error::Result;
use crate::types::VectorStoreQuery;

/// Core trait for vector store backends
///
/// Similarity is cosine unless an implementation documents otherwise.
/// `add` is idempotent for a given `(id, embedding, metadata)`; deleted
/// ids do not appear in subsequent query results.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace nodes by id; every node must carry a non-empty
    /// embedding
    async fn add(&self, ctx: &CancellationToken, nodes: &[Node]) -> Result<Vec<String>>;

    /// Return at most `top_k` nodes in descending score order
    async fn query(
        &self,
        ctx: &CancellationToken,
        query: &VectorStoreQuery,
    ) -> Result<Vec<NodeWithScore>>;

    /// Remove every node whose source ref-doc id (or own id, when it has
    /// no source) equals the argument
    async fn delete(&self, ctx: &CancellationToken, ref_doc_id: &str) -> Result<()>;
}

/// Whether `node` belongs to the given ref-doc
pub(crate) fn belongs_to_ref_doc(node: &Node, ref_doc_id: &str) -> bool {
    match node.ref_doc_id() {
        Some(source) => source == ref_doc_id,
        None => node.id == ref_doc_id,
    }
}
