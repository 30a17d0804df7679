//! Persistent HNSW vector store
//!
//! Approximate nearest-neighbor store backed by `hnsw_rs`. The store owns
//! its nodes; the index is (re)built from them after mutations, so delete
//! works by rebuild rather than by tombstone. Persistence writes the
//! owned nodes to a self-describing JSON envelope and re-indexes on load.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::DistCosine;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lodestone_core::cancellation::ensure_active;
use lodestone_core::{Error as CoreError, Node, NodeWithScore};

use crate::error::{Result, VectorError};
use crate::store::{belongs_to_ref_doc, VectorStore};
use crate::types::VectorStoreQuery;

/// Format tag written into the persistence envelope
const PERSIST_FORMAT: &str = "lodestone.vector.hnsw.v1";

/// HNSW build and search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Maximum connections per layer
    pub m: usize,
    /// Candidate list size during construction
    pub ef_construction: usize,
    /// Candidate list size during search
    pub ef_search: usize,
    /// Layer count override; derived from the element count when unset
    pub nb_layers: Option<usize>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            nb_layers: None,
        }
    }
}

/// Owned node data plus the index built over it
struct Inner {
    nodes: Vec<Node>,
    id_to_pos: HashMap<String, usize>,
    index: Option<Hnsw<'static, f32, DistCosine>>,
    dimension: Option<usize>,
}

impl Inner {
    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            id_to_pos: HashMap::new(),
            index: None,
            dimension: None,
        }
    }

    fn upsert(&mut self, node: Node) {
        match self.id_to_pos.get(&node.id) {
            Some(&pos) => self.nodes[pos] = node,
            None => {
                self.id_to_pos.insert(node.id.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
        self.index = None;
    }

    fn remove_ref_doc(&mut self, ref_doc_id: &str) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|node| !belongs_to_ref_doc(node, ref_doc_id));
        self.id_to_pos = self
            .nodes
            .iter()
            .enumerate()
            .map(|(pos, node)| (node.id.clone(), pos))
            .collect();
        self.index = None;
        before - self.nodes.len()
    }

    /// Build the index over all stored vectors
    fn build_index(&mut self, config: &HnswConfig) {
        let max_elements = self.nodes.len().max(1000);
        let nb_layers = config
            .nb_layers
            .unwrap_or_else(|| 16.min((max_elements as f32).ln() as usize).max(1));

        let index = Hnsw::new(
            config.m,
            max_elements,
            nb_layers,
            config.ef_construction,
            DistCosine,
        );

        let vector_refs: Vec<(&Vec<f32>, usize)> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(pos, node)| node.embedding.as_ref().map(|e| (e, pos)))
            .collect();
        if !vector_refs.is_empty() {
            index.parallel_insert(&vector_refs);
        }

        debug!(vectors = vector_refs.len(), nb_layers, "hnsw index built");
        self.index = Some(index);
    }
}

/// Persistence envelope; carries its own format tag so loads can validate
#[derive(Serialize, Deserialize)]
struct PersistedStore {
    format: String,
    saved_at: DateTime<Utc>,
    config: HnswConfig,
    nodes: Vec<Node>,
}

/// HNSW-backed vector store with JSON persistence
pub struct HnswVectorStore {
    inner: RwLock<Inner>,
    config: HnswConfig,
}

impl std::fmt::Debug for HnswVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswVectorStore")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

impl HnswVectorStore {
    pub fn new(config: HnswConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::empty()),
            config,
        }
    }

    /// Number of stored nodes
    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().nodes.is_empty()
    }

    /// Write the store to `path` as a self-describing JSON envelope
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let inner = self.inner.read();
        let envelope = PersistedStore {
            format: PERSIST_FORMAT.to_string(),
            saved_at: Utc::now(),
            config: self.config.clone(),
            nodes: inner.nodes.clone(),
        };
        let file = File::create(path.as_ref())?;
        serde_json::to_writer(BufWriter::new(file), &envelope)?;
        info!(
            nodes = envelope.nodes.len(),
            path = %path.as_ref().display(),
            "hnsw store persisted"
        );
        Ok(())
    }

    /// Load a store persisted with [`persist`](Self::persist) and rebuild
    /// the index
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let envelope: PersistedStore = serde_json::from_reader(BufReader::new(file))?;
        if envelope.format != PERSIST_FORMAT {
            return Err(CoreError::Configuration(format!(
                "unknown vector store format '{}', expected '{}'",
                envelope.format, PERSIST_FORMAT
            ))
            .into());
        }

        let mut inner = Inner::empty();
        inner.dimension = envelope
            .nodes
            .iter()
            .find_map(|node| node.embedding.as_ref().map(|e| e.len()));
        for node in envelope.nodes {
            inner.upsert(node);
        }
        inner.build_index(&envelope.config);

        info!(
            nodes = inner.nodes.len(),
            path = %path.as_ref().display(),
            "hnsw store loaded"
        );
        Ok(Self {
            inner: RwLock::new(inner),
            config: envelope.config,
        })
    }
}

#[async_trait]
impl VectorStore for HnswVectorStore {
    async fn add(&self, ctx: &CancellationToken, nodes: &[Node]) -> Result<Vec<String>> {
        ensure_active(ctx)?;

        let mut inner = self.inner.write();
        for node in nodes {
            let embedding = match &node.embedding {
                Some(e) if !e.is_empty() => e,
                _ => return Err(VectorError::MissingEmbedding(node.id.clone())),
            };
            match inner.dimension {
                None => inner.dimension = Some(embedding.len()),
                Some(expected) if expected != embedding.len() => {
                    return Err(VectorError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                Some(_) => {}
            }
        }

        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            ids.push(node.id.clone());
            inner.upsert(node.clone());
        }
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

        let mut inner = self.inner.write();
        if inner.nodes.is_empty() {
            return Ok(Vec::new());
        }
        if inner.index.is_none() {
            inner.build_index(&self.config);
        }
        let inner = parking_lot::RwLockWriteGuard::downgrade(inner);
        let index = inner
            .index
            .as_ref()
            .ok_or_else(|| VectorError::Internal("hnsw index missing after build".to_string()))?;

        // With filters active the candidate set is over-fetched, then
        // filtered; an ANN pass cannot know in advance which neighbors
        // survive the filter.
        let fetch_k = if query.filters.is_some() {
            query.top_k * 4 + 16
        } else {
            query.top_k
        };
        let ef = self.config.ef_search.max(fetch_k);
        let neighbours = index.search(query.embedding.as_slice(), fetch_k, ef);

        let mut results = Vec::with_capacity(neighbours.len());
        for neighbour in neighbours {
            let node = match inner.nodes.get(neighbour.d_id) {
                Some(node) => node,
                None => {
                    return Err(VectorError::Internal(format!(
                        "hnsw returned unknown data id {}",
                        neighbour.d_id
                    )))
                }
            };
            if let Some(filters) = &query.filters {
                if !filters.matches(&node.metadata)? {
                    continue;
                }
            }
            // DistCosine is a distance; flip it back into a similarity
            results.push(NodeWithScore::new(node.clone(), 1.0 - neighbour.distance));
        }

        lodestone_core::node::sort_by_score_desc(&mut results);
        results.truncate(query.top_k);
        Ok(results)
    }

    async fn delete(&self, ctx: &CancellationToken, ref_doc_id: &str) -> Result<()> {
        ensure_active(ctx)?;
        let removed = self.inner.write().remove_ref_doc(ref_doc_id);
        debug!(ref_doc_id, removed, "hnsw store delete");
        Ok(())
    }
}
