//! Hierarchical splitting into a parent/child forest
//!
//! Splits a document at each of a descending list of chunk sizes. Level 0
//! chunks come from the document; every deeper level is split from its
//! parent chunk and linked with parent/child relationships. The finest
//! chunks (those without children) are the ones to embed and index;
//! auto-merging retrieval walks back up the forest at query time.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::cancellation::ensure_active;
use lodestone_core::{Node, NodeRelationship, NodeType};

use crate::error::{RagError, Result};
use crate::pipeline::Transform;
use crate::splitter::{chain_siblings, SentenceSplitter};

/// Splitter producing a forest of chunks at descending sizes
pub struct HierarchicalSplitter {
    chunk_sizes: Vec<usize>,
    splitters: Vec<SentenceSplitter>,
}

impl HierarchicalSplitter {
    /// Default level sizes in tokens, coarse to fine
    pub const DEFAULT_CHUNK_SIZES: [usize; 3] = [2048, 512, 128];

    pub fn new(chunk_sizes: Vec<usize>) -> Result<Self> {
        if chunk_sizes.is_empty() {
            return Err(RagError::Configuration(
                "hierarchical splitter needs at least one chunk size".to_string(),
            ));
        }
        for pair in chunk_sizes.windows(2) {
            if pair[1] >= pair[0] {
                return Err(RagError::Configuration(format!(
                    "hierarchical chunk sizes must be strictly descending, got {:?}",
                    chunk_sizes
                )));
            }
        }
        let splitters = chunk_sizes
            .iter()
            .map(|&size| SentenceSplitter::new(size, 0))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            chunk_sizes,
            splitters,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(Self::DEFAULT_CHUNK_SIZES.to_vec())
    }

    pub fn chunk_sizes(&self) -> &[usize] {
        &self.chunk_sizes
    }

    /// Split one document into its full forest, coarse levels first
    pub fn split_document(&self, doc: &Node) -> Result<Vec<Node>> {
        let source = doc.as_related_node_info();

        let mut levels: Vec<Vec<Node>> = Vec::with_capacity(self.splitters.len());

        // Level 0 splits the document itself
        let spans = self.splitters[0].chunk_spans(doc)?;
        let mut level0: Vec<Node> = Vec::with_capacity(spans.len());
        for (i, (s, e)) in spans.into_iter().enumerate() {
            let mut chunk = new_chunk(doc, format!("{}:0:{}", doc.id, i), &doc.text[s..e]);
            chunk.start_char_idx = Some(s);
            chunk.end_char_idx = Some(e);
            chunk.set_relationship(NodeRelationship::Source, source.clone());
            level0.push(chunk);
        }
        chain_siblings(&mut level0);
        levels.push(level0);

        for level in 1..self.splitters.len() {
            let mut level_nodes: Vec<Node> = Vec::new();
            let mut counter = 0usize;

            for parent_idx in 0..levels[level - 1].len() {
                let (spans, parent_start, parent_info, parent_text) = {
                    let parent = &levels[level - 1][parent_idx];
                    let spans = self.splitters[level].chunk_spans(parent)?;
                    (
                        spans,
                        parent.start_char_idx.unwrap_or(0),
                        parent.as_related_node_info(),
                        parent.text.clone(),
                    )
                };
                // A parent already within the finer budget stays a leaf
                if spans.len() <= 1 {
                    continue;
                }

                for (s, e) in spans {
                    let mut child = new_chunk(
                        doc,
                        format!("{}:{}:{}", doc.id, level, counter),
                        &parent_text[s..e],
                    );
                    counter += 1;
                    child.start_char_idx = Some(parent_start + s);
                    child.end_char_idx = Some(parent_start + e);
                    child.set_relationship(NodeRelationship::Source, source.clone());
                    child.set_relationship(NodeRelationship::Parent, parent_info.clone());
                    levels[level - 1][parent_idx].push_child(child.as_related_node_info());
                    level_nodes.push(child);
                }
            }

            chain_siblings(&mut level_nodes);
            levels.push(level_nodes);
        }

        Ok(levels.into_iter().flatten().collect())
    }
}

fn new_chunk(doc: &Node, id: String, text: &str) -> Node {
    let mut chunk = Node::with_id(id, text.to_string());
    chunk.node_type = NodeType::Text;
    chunk.metadata = doc.metadata.clone();
    chunk.excluded_embed_metadata_keys = doc.excluded_embed_metadata_keys.clone();
    chunk.excluded_llm_metadata_keys = doc.excluded_llm_metadata_keys.clone();
    chunk
}

/// Nodes with no children: the finest level of the forest
pub fn leaf_nodes(nodes: &[Node]) -> Vec<Node> {
    nodes
        .iter()
        .filter(|n| n.child_nodes().is_empty())
        .cloned()
        .collect()
}

/// Nodes with no parent: the coarsest level of the forest
pub fn root_nodes(nodes: &[Node]) -> Vec<Node> {
    nodes
        .iter()
        .filter(|n| n.parent_node().is_none())
        .cloned()
        .collect()
}

#[async_trait]
impl Transform for HierarchicalSplitter {
    fn name(&self) -> &str {
        "hierarchical_splitter"
    }

    async fn transform(&self, ctx: &CancellationToken, nodes: Vec<Node>) -> Result<Vec<Node>> {
        ensure_active(ctx)?;
        let mut out = Vec::new();
        for node in &nodes {
            let forest = self.split_document(node)?;
            debug!(node = %node.id, nodes = forest.len(), "hierarchical split");
            out.extend(forest);
        }
        Ok(out)
    }
}
