//! Ingestion pipeline
//!
//! Converts documents into embedded, relationship-linked nodes: normalize
//! inputs, reconcile them against the document store with a dedup
//! strategy, run the transform chain (consulting the ingestion cache
//! between steps), then write embedded nodes to the vector store and all
//! output nodes to the docstore.
//!
//! Failures propagate without rollback; a re-run dedups past completed
//! work. The pipeline holds only immutable configuration after
//! construction and is safe to share.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lodestone_core::cancellation::ensure_active;
use lodestone_core::embedding::EmbeddingModel;
use lodestone_core::{MetadataMode, Node, NodeType};
use lodestone_vector::VectorStore;

use crate::cache::{cache_key, IngestionCache};
use crate::docstore::DocumentStore;
use crate::error::{RagError, Result};

/// A step in the transform chain
///
/// Pure over its inputs: equal input nodes produce equal outputs. That
/// purity is what makes the ingestion cache sound.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Stable name; part of the cache key
    fn name(&self) -> &str;

    async fn transform(&self, ctx: &CancellationToken, nodes: Vec<Node>) -> Result<Vec<Node>>;
}

/// Transform that fills node embeddings
pub struct Embedder {
    model: Arc<dyn EmbeddingModel>,
}

impl Embedder {
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Transform for Embedder {
    fn name(&self) -> &str {
        "embedder"
    }

    async fn transform(&self, ctx: &CancellationToken, nodes: Vec<Node>) -> Result<Vec<Node>> {
        let texts: Vec<String> = nodes
            .iter()
            .map(|n| n.content(MetadataMode::Embed))
            .collect();
        let embeddings = self.model.get_text_embedding_batch(ctx, &texts).await?;

        let mut out = nodes;
        for (node, embedding) in out.iter_mut().zip(embeddings) {
            node.embedding = Some(embedding);
        }
        Ok(out)
    }
}

/// How incoming documents reconcile with the docstore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocstoreStrategy {
    /// New ids are queued; unchanged ids are dropped; changed ids replace
    /// their previous ingestion
    #[default]
    Upserts,
    /// `Upserts`, then prune every known ref-doc absent from the batch
    UpsertsAndDelete,
    /// Drop any node whose content hash is already known
    DuplicatesOnly,
}

/// The ingestion pipeline
pub struct IngestionPipeline {
    transforms: Vec<Arc<dyn Transform>>,
    docstore: Option<Arc<dyn DocumentStore>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    cache: Option<Arc<IngestionCache>>,
    strategy: DocstoreStrategy,
}

impl IngestionPipeline {
    pub fn builder() -> IngestionPipelineBuilder {
        IngestionPipelineBuilder::new()
    }

    /// Run documents (and bare nodes) through the pipeline
    ///
    /// Returns the nodes produced by this run; nodes dropped by the dedup
    /// gate are not re-processed and not returned.
    pub async fn run(
        &self,
        ctx: &CancellationToken,
        documents: Vec<Node>,
        nodes: Vec<Node>,
    ) -> Result<Vec<Node>> {
        ensure_active(ctx)?;

        let mut inputs: Vec<Node> = Vec::with_capacity(documents.len() + nodes.len());
        for mut doc in documents {
            doc.node_type = NodeType::Document;
            doc.validate()?;
            inputs.push(doc);
        }
        for node in nodes {
            node.validate()?;
            inputs.push(node);
        }
        info!(
            inputs = inputs.len(),
            strategy = ?self.strategy,
            "ingestion run started"
        );

        let queued = match &self.docstore {
            Some(docstore) => self.dedup(ctx, docstore.as_ref(), inputs).await?,
            None => inputs,
        };

        if queued.is_empty() {
            info!("ingestion run complete, nothing to process");
            return Ok(Vec::new());
        }

        let mut current = queued;
        for transform in &self.transforms {
            ensure_active(ctx)?;
            let key = cache_key(transform.name(), &current);
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get(&key) {
                    debug!(transform = transform.name(), "cache hit, transform skipped");
                    current = hit;
                    continue;
                }
            }
            current = transform.transform(ctx, current).await?;
            if let Some(cache) = &self.cache {
                cache.put(key, transform.name(), current.clone());
            }
        }

        if let Some(vector_store) = &self.vector_store {
            let embedded: Vec<Node> = current
                .iter()
                .filter(|n| n.embedding.is_some())
                .cloned()
                .collect();
            if !embedded.is_empty() {
                vector_store.add(ctx, &embedded).await?;
            }
        }
        if let Some(docstore) = &self.docstore {
            docstore.add_documents(ctx, &current).await?;
        }

        info!(outputs = current.len(), "ingestion run complete");
        Ok(current)
    }

    async fn dedup(
        &self,
        ctx: &CancellationToken,
        docstore: &dyn DocumentStore,
        inputs: Vec<Node>,
    ) -> Result<Vec<Node>> {
        match self.strategy {
            DocstoreStrategy::Upserts | DocstoreStrategy::UpsertsAndDelete => {
                let mut queued = Vec::new();
                let mut batch_ids: HashSet<String> = HashSet::with_capacity(inputs.len());

                for node in inputs {
                    let hash = node.hash();
                    batch_ids.insert(node.id.clone());
                    match docstore.get_document_hash(ctx, &node.id).await? {
                        None => {
                            docstore.set_document_hash(ctx, &node.id, &hash).await?;
                            queued.push(node);
                        }
                        Some(existing) if existing == hash => {
                            debug!(id = %node.id, "ref-doc unchanged, dropped");
                        }
                        Some(_) => {
                            debug!(id = %node.id, "ref-doc changed, replacing");
                            docstore.delete_ref_doc(ctx, &node.id).await?;
                            if let Some(vector_store) = &self.vector_store {
                                vector_store.delete(ctx, &node.id).await?;
                            }
                            docstore.set_document_hash(ctx, &node.id, &hash).await?;
                            queued.push(node);
                        }
                    }
                }

                if self.strategy == DocstoreStrategy::UpsertsAndDelete {
                    let existing = docstore.all_document_hashes(ctx).await?;
                    for id in existing.keys() {
                        if !batch_ids.contains(id) {
                            debug!(id = %id, "ref-doc absent from batch, pruned");
                            docstore.delete_ref_doc(ctx, id).await?;
                            if let Some(vector_store) = &self.vector_store {
                                vector_store.delete(ctx, id).await?;
                            }
                        }
                    }
                }
                Ok(queued)
            }
            DocstoreStrategy::DuplicatesOnly => {
                let mut seen: HashSet<String> = docstore
                    .all_document_hashes(ctx)
                    .await?
                    .into_values()
                    .collect();
                let mut queued = Vec::new();
                for node in inputs {
                    let hash = node.hash();
                    if seen.contains(&hash) {
                        debug!(id = %node.id, "duplicate hash, dropped");
                        continue;
                    }
                    docstore.set_document_hash(ctx, &node.id, &hash).await?;
                    seen.insert(hash);
                    queued.push(node);
                }
                Ok(queued)
            }
        }
    }
}

/// Builder for [`IngestionPipeline`]
pub struct IngestionPipelineBuilder {
    transforms: Vec<Arc<dyn Transform>>,
    docstore: Option<Arc<dyn DocumentStore>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    cache: Option<Arc<IngestionCache>>,
    strategy: DocstoreStrategy,
}

impl IngestionPipelineBuilder {
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
            docstore: None,
            vector_store: None,
            cache: None,
            strategy: DocstoreStrategy::default(),
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_docstore(mut self, docstore: Arc<dyn DocumentStore>) -> Self {
        self.docstore = Some(docstore);
        self
    }

    pub fn with_vector_store(mut self, vector_store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(vector_store);
        self
    }

    pub fn with_cache(mut self, cache: Arc<IngestionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_strategy(mut self, strategy: DocstoreStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn build(self) -> Result<IngestionPipeline> {
        if self.docstore.is_none()
            && matches!(
                self.strategy,
                DocstoreStrategy::UpsertsAndDelete | DocstoreStrategy::DuplicatesOnly
            )
        {
            return Err(RagError::Configuration(format!(
                "{:?} dedup strategy requires a document store",
                self.strategy
            )));
        }
        Ok(IngestionPipeline {
            transforms: self.transforms,
            docstore: self.docstore,
            vector_store: self.vector_store,
            cache: self.cache,
            strategy: self.strategy,
        })
    }
}

impl Default for IngestionPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::embedding::MockEmbeddingModel;

    #[test]
    fn test_builder_validates_strategy() {
        let err = IngestionPipeline::builder()
            .with_strategy(DocstoreStrategy::UpsertsAndDelete)
            .build();
        assert!(matches!(err, Err(RagError::Configuration(_))));

        assert!(IngestionPipeline::builder().build().is_ok());
    }

    #[tokio::test]
    async fn test_embedder_fills_embeddings() {
        let embedder = Embedder::new(Arc::new(MockEmbeddingModel::new(8)));
        let ctx = CancellationToken::new();

        let nodes = vec![Node::with_id("a", "alpha"), Node::with_id("b", "beta")];
        let out = embedder.transform(&ctx, nodes).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|n| n.embedding.as_ref().unwrap().len() == 8));
    }

    #[tokio::test]
    async fn test_run_without_stores_applies_transforms() {
        let pipeline = IngestionPipeline::builder()
            .with_transform(Arc::new(Embedder::new(Arc::new(MockEmbeddingModel::new(4)))))
            .build()
            .unwrap();
        let ctx = CancellationToken::new();

        let out = pipeline
            .run(&ctx, vec![Node::document("d1", "text")], Vec::new())
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].embedding.is_some());
    }

    #[tokio::test]
    async fn test_run_canceled() {
        let pipeline = IngestionPipeline::builder().build().unwrap();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = pipeline.run(&ctx, Vec::new(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, RagError::Canceled));
    }
}
