//! Fusion over multiple retrievers
//!
//! Combines the ranked lists of N child retrievers into one. Results are
//! deduplicated by node content hash, so the same chunk surfacing under
//! different ids from different retrievers merges into one entry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::node::sort_by_score_desc;
use lodestone_core::{NodeWithScore, QueryBundle};

use crate::error::{RagError, Result};
use crate::retriever::Retriever;

/// Reciprocal-rank-fusion constant
const RRF_K: f32 = 60.0;

/// Score aggregation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionMode {
    /// Union by node hash, score is the maximum seen
    #[default]
    Simple,
    /// Sum of `1 / (rank + 60)` across retrievers
    ReciprocalRerank,
    /// Min-max normalize each list to [0, 1], weight, then sum
    RelativeScore,
    /// Like `RelativeScore` with a `mean ± 3·stddev` normalization range
    DistBasedScore,
}

/// Retriever fusing the results of several child retrievers
pub struct FusionRetriever {
    retrievers: Vec<Arc<dyn Retriever>>,
    mode: FusionMode,
    similarity_top_k: usize,
    retriever_weights: Vec<f32>,
}

impl FusionRetriever {
    pub fn new(
        retrievers: Vec<Arc<dyn Retriever>>,
        mode: FusionMode,
        similarity_top_k: usize,
    ) -> Result<Self> {
        if retrievers.is_empty() {
            return Err(RagError::Configuration(
                "fusion retriever needs at least one child retriever".to_string(),
            ));
        }
        let weights = vec![1.0; retrievers.len()];
        Ok(Self {
            retrievers,
            mode,
            similarity_top_k,
            retriever_weights: weights,
        })
    }

    /// Weight the children for the score-normalizing modes
    ///
    /// Weights are normalized to sum to 1 at fusion time; they are
    /// ignored by `Simple` and `ReciprocalRerank`.
    pub fn with_weights(mut self, weights: Vec<f32>) -> Result<Self> {
        if weights.len() != self.retrievers.len() {
            return Err(RagError::Configuration(format!(
                "got {} weights for {} retrievers",
                weights.len(),
                self.retrievers.len()
            )));
        }
        self.retriever_weights = weights;
        Ok(self)
    }

    fn normalized_weights(&self) -> Vec<f32> {
        let total: f32 = self.retriever_weights.iter().sum();
        if total <= 0.0 {
            vec![1.0 / self.retriever_weights.len() as f32; self.retriever_weights.len()]
        } else {
            self.retriever_weights.iter().map(|w| w / total).collect()
        }
    }

    fn fuse(&self, result_lists: Vec<Vec<NodeWithScore>>) -> Vec<NodeWithScore> {
        match self.mode {
            FusionMode::Simple => fuse_simple(result_lists),
            FusionMode::ReciprocalRerank => fuse_reciprocal(result_lists),
            FusionMode::RelativeScore => {
                fuse_normalized(result_lists, &self.normalized_weights(), false)
            }
            FusionMode::DistBasedScore => {
                fuse_normalized(result_lists, &self.normalized_weights(), true)
            }
        }
    }
}

fn fuse_simple(result_lists: Vec<Vec<NodeWithScore>>) -> Vec<NodeWithScore> {
    let mut by_hash: HashMap<String, NodeWithScore> = HashMap::new();
    for list in result_lists {
        for result in list {
            let hash = result.node.hash();
            match by_hash.get_mut(&hash) {
                Some(existing) => existing.score = existing.score.max(result.score),
                None => {
                    by_hash.insert(hash, result);
                }
            }
        }
    }
    by_hash.into_values().collect()
}

fn fuse_reciprocal(result_lists: Vec<Vec<NodeWithScore>>) -> Vec<NodeWithScore> {
    let mut by_hash: HashMap<String, NodeWithScore> = HashMap::new();
    for list in result_lists {
        for (rank, result) in list.into_iter().enumerate() {
            let contribution = 1.0 / (rank as f32 + RRF_K);
            let hash = result.node.hash();
            match by_hash.get_mut(&hash) {
                Some(existing) => existing.score += contribution,
                None => {
                    by_hash.insert(hash, NodeWithScore::new(result.node, contribution));
                }
            }
        }
    }
    by_hash.into_values().collect()
}

fn fuse_normalized(
    result_lists: Vec<Vec<NodeWithScore>>,
    weights: &[f32],
    dist_based: bool,
) -> Vec<NodeWithScore> {
    let mut by_hash: HashMap<String, NodeWithScore> = HashMap::new();
    for (list, &weight) in result_lists.into_iter().zip(weights) {
        let normalized = normalize_scores(&list, dist_based);
        for (result, score) in list.into_iter().zip(normalized) {
            let contribution = weight * score;
            let hash = result.node.hash();
            match by_hash.get_mut(&hash) {
                Some(existing) => existing.score += contribution,
                None => {
                    by_hash.insert(hash, NodeWithScore::new(result.node, contribution));
                }
            }
        }
    }
    by_hash.into_values().collect()
}

fn normalize_scores(list: &[NodeWithScore], dist_based: bool) -> Vec<f32> {
    if list.is_empty() {
        return Vec::new();
    }
    if !dist_based && list.len() == 1 {
        // a single result carries no spread to normalize against
        return vec![1.0];
    }

    let scores: Vec<f32> = list.iter().map(|r| r.score).collect();
    let (min, max) = if dist_based {
        let mean = scores.iter().sum::<f32>() / scores.len() as f32;
        let variance =
            scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / scores.len() as f32;
        let stddev = variance.sqrt();
        (mean - 3.0 * stddev, mean + 3.0 * stddev)
    } else {
        let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        (min, max)
    };

    let denom = if max > min { max - min } else { 1.0 };
    scores.iter().map(|s| (s - min) / denom).collect()
}

#[async_trait]
impl Retriever for FusionRetriever {
    async fn retrieve(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
    ) -> Result<Vec<NodeWithScore>> {
        let mut result_lists = Vec::with_capacity(self.retrievers.len());
        for retriever in &self.retrievers {
            result_lists.push(retriever.retrieve(ctx, query).await?);
        }

        let mut fused = self.fuse(result_lists);
        sort_by_score_desc(&mut fused);
        fused.truncate(self.similarity_top_k);
        debug!(mode = ?self.mode, results = fused.len(), "fusion retrieval");
        Ok(fused)
    }
}
