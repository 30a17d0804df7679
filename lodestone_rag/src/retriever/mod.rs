//! Retrievers
//!
//! A retriever maps a [`QueryBundle`] to a ranked list of scored nodes.
//! [`VectorRetriever`] is the base case over a vector store; fusion,
//! auto-merging, and routing layer on top of other retrievers.

pub mod auto_merging;
pub mod fusion;
pub mod router;
pub mod vector;

pub use auto_merging::AutoMergingRetriever;
pub use fusion::{FusionMode, FusionRetriever};
pub use router::{
    MultiSelector, RetrieverTool, RouterRetriever, Selection, Selector, SimpleSelector,
    SingleSelector, ToolMetadata,
};
pub use vector::VectorRetriever;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lodestone_core::{NodeWithScore, QueryBundle};

use crate::error::Result;

/// Maps a query to a ranked list of scored nodes
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
    ) -> Result<Vec<NodeWithScore>>;
}
