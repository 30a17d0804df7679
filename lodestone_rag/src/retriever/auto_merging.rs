//! Auto-merging retrieval over a chunk hierarchy
//!
//! Operates on the forest produced by the hierarchical splitter. Results
//! from a base retriever are first put in positional order, then missing
//! chunks between retrieved neighbors are filled in from the docstore,
//! and groups of siblings covering enough of their parent are replaced by
//! the parent itself. Fill and merge repeat until a pass changes nothing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::node::sort_by_score_desc;
use lodestone_core::{NodeWithScore, QueryBundle};

use crate::docstore::DocumentStore;
use crate::error::{RagError, Result};
use crate::retriever::Retriever;

/// Upper bound on fill/merge rounds; exceeding it means the relationship
/// graph is malformed
const MAX_ROUNDS: usize = 16;

/// Retriever that merges retrieved child chunks up into their parents
pub struct AutoMergingRetriever {
    base: Arc<dyn Retriever>,
    docstore: Arc<dyn DocumentStore>,
    simple_ratio_thresh: f32,
}

impl AutoMergingRetriever {
    /// Default fraction of a parent's children that must be retrieved
    /// before merging
    pub const DEFAULT_RATIO_THRESH: f32 = 0.5;

    pub fn new(base: Arc<dyn Retriever>, docstore: Arc<dyn DocumentStore>) -> Self {
        Self {
            base,
            docstore,
            simple_ratio_thresh: Self::DEFAULT_RATIO_THRESH,
        }
    }

    pub fn with_ratio_thresh(mut self, thresh: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&thresh) {
            return Err(RagError::Configuration(format!(
                "merge ratio threshold must lie in [0, 1], got {thresh}"
            )));
        }
        self.simple_ratio_thresh = thresh;
        Ok(self)
    }

    /// Fill single-chunk gaps between positionally adjacent results
    async fn fill_gaps(
        &self,
        ctx: &CancellationToken,
        mut results: Vec<NodeWithScore>,
    ) -> Result<(Vec<NodeWithScore>, bool)> {
        // Adjacency is only meaningful in positional order
        results.sort_by(|a, b| order_key(a).cmp(&order_key(b)));

        let present: HashSet<String> = results.iter().map(|r| r.node.id.clone()).collect();
        let mut requested: HashSet<String> = HashSet::new();
        let mut inserted: Vec<NodeWithScore> = Vec::new();

        for pair in results.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.node.ref_doc_id() != b.node.ref_doc_id() {
                continue;
            }
            let (Some(next), Some(prev)) = (a.node.next_node(), b.node.prev_node()) else {
                continue;
            };
            if next.node_id != prev.node_id || next.node_id == b.node.id {
                continue;
            }

            let missing = next.node_id.clone();
            if missing == a.node.id {
                return Err(RagError::Internal(format!(
                    "relationship cycle through node {missing}"
                )));
            }
            if present.contains(&missing) {
                continue;
            }
            if !requested.insert(missing.clone()) {
                return Err(RagError::Internal(format!(
                    "relationship cycle through node {missing}"
                )));
            }

            if let Some(node) = self.docstore.get_document(ctx, &missing).await? {
                let score = (a.score + b.score) / 2.0;
                debug!(id = %missing, score, "gap filled");
                inserted.push(NodeWithScore::new(node, score));
            }
        }

        let changed = !inserted.is_empty();
        results.extend(inserted);
        Ok((results, changed))
    }

    /// Replace sibling groups with their parent once coverage crosses the
    /// threshold; the parent takes the mean of its merged children
    async fn merge_up(
        &self,
        ctx: &CancellationToken,
        results: Vec<NodeWithScore>,
    ) -> Result<(Vec<NodeWithScore>, bool)> {
        let mut by_parent: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, result) in results.iter().enumerate() {
            if let Some(parent) = result.node.parent_node() {
                by_parent.entry(parent.node_id.clone()).or_default().push(i);
            }
        }
        let present: HashSet<String> = results.iter().map(|r| r.node.id.clone()).collect();

        let mut to_remove: HashSet<usize> = HashSet::new();
        let mut to_add: Vec<NodeWithScore> = Vec::new();
        for (parent_id, child_idxs) in by_parent {
            let Some(parent) = self.docstore.get_document(ctx, &parent_id).await? else {
                continue;
            };
            let total_children = parent.child_nodes().len();
            if total_children == 0 {
                continue;
            }

            let distinct: HashSet<&str> = child_idxs
                .iter()
                .map(|&i| results[i].node.id.as_str())
                .collect();
            let ratio = distinct.len() as f32 / total_children as f32;
            if ratio <= self.simple_ratio_thresh {
                continue;
            }

            let mean = child_idxs.iter().map(|&i| results[i].score).sum::<f32>()
                / child_idxs.len() as f32;
            debug!(parent = %parent_id, children = distinct.len(), total_children, "merged up");
            to_remove.extend(child_idxs);
            if !present.contains(&parent_id) && !to_add.iter().any(|r| r.node.id == parent_id) {
                to_add.push(NodeWithScore::new(parent, mean));
            }
        }

        let changed = !to_remove.is_empty();
        let mut out: Vec<NodeWithScore> = results
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !to_remove.contains(i))
            .map(|(_, r)| r)
            .collect();
        out.extend(to_add);
        Ok((out, changed))
    }

    /// Drop any result whose ancestor is also a result
    async fn drop_covered(
        &self,
        ctx: &CancellationToken,
        results: Vec<NodeWithScore>,
    ) -> Result<Vec<NodeWithScore>> {
        let ids: HashSet<String> = results.iter().map(|r| r.node.id.clone()).collect();
        let mut kept = Vec::with_capacity(results.len());

        'outer: for result in results {
            let mut visited: HashSet<String> = HashSet::new();
            let mut current = result.node.parent_node().map(|p| p.node_id.clone());
            while let Some(parent_id) = current {
                if !visited.insert(parent_id.clone()) {
                    return Err(RagError::Internal(format!(
                        "relationship cycle through node {parent_id}"
                    )));
                }
                if ids.contains(&parent_id) {
                    debug!(id = %result.node.id, ancestor = %parent_id, "covered by ancestor, dropped");
                    continue 'outer;
                }
                current = match self.docstore.get_document(ctx, &parent_id).await? {
                    Some(parent) => parent.parent_node().map(|p| p.node_id.clone()),
                    None => None,
                };
            }
            kept.push(result);
        }
        Ok(kept)
    }
}

fn order_key(result: &NodeWithScore) -> (String, usize, String) {
    (
        result.node.ref_doc_id().unwrap_or_default().to_string(),
        result.node.start_char_idx.unwrap_or(0),
        result.node.id.clone(),
    )
}

#[async_trait]
impl Retriever for AutoMergingRetriever {
    async fn retrieve(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
    ) -> Result<Vec<NodeWithScore>> {
        let mut results = self.base.retrieve(ctx, query).await?;

        for round in 0.. {
            if round >= MAX_ROUNDS {
                return Err(RagError::Internal(
                    "auto-merging did not converge; relationship graph is malformed".to_string(),
                ));
            }
            let (filled, fill_changed) = self.fill_gaps(ctx, results).await?;
            let (merged, merge_changed) = self.merge_up(ctx, filled).await?;
            results = merged;
            if !fill_changed && !merge_changed {
                break;
            }
        }

        results = self.drop_covered(ctx, results).await?;
        sort_by_score_desc(&mut results);
        Ok(results)
    }
}
