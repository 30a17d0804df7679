//! Query engine
//!
//! Binds one retriever to one synthesizer. Errors are wrapped at the
//! component boundary they crossed, and the first failure short-circuits.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lodestone_core::QueryBundle;

use crate::error::{RagError, Result};
use crate::retriever::Retriever;
use crate::synthesis::{EngineResponse, StreamingEngineResponse, Synthesizer};

/// Retrieval-augmented query engine
pub struct QueryEngine {
    retriever: Arc<dyn Retriever>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl QueryEngine {
    pub fn new(retriever: Arc<dyn Retriever>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            retriever,
            synthesizer,
        }
    }

    /// Retrieve context and synthesize a complete answer
    pub async fn query(
        &self,
        ctx: &CancellationToken,
        query: impl Into<QueryBundle>,
    ) -> Result<EngineResponse> {
        let query = query.into();
        info!(query = %query.query, "query started");

        let nodes = self
            .retriever
            .retrieve(ctx, &query)
            .await
            .map_err(|e| RagError::Retrieve(Box::new(e)))?;
        debug!(retrieved = nodes.len(), "retrieval complete");

        let response = self
            .synthesizer
            .synthesize(ctx, &query, nodes)
            .await
            .map_err(|e| RagError::Synthesize(Box::new(e)))?;
        info!(sources = response.source_nodes.len(), "query complete");
        Ok(response)
    }

    /// Retrieve context and stream the answer
    ///
    /// Source nodes are available on the returned response immediately;
    /// the stream must be fully consumed or canceled via the token.
    pub async fn query_stream(
        &self,
        ctx: &CancellationToken,
        query: impl Into<QueryBundle>,
    ) -> Result<StreamingEngineResponse> {
        let query = query.into();
        info!(query = %query.query, "streaming query started");

        let nodes = self
            .retriever
            .retrieve(ctx, &query)
            .await
            .map_err(|e| RagError::Retrieve(Box::new(e)))?;
        debug!(retrieved = nodes.len(), "retrieval complete");

        self.synthesizer
            .synthesize_stream(ctx, &query, nodes)
            .await
            .map_err(|e| RagError::Synthesize(Box::new(e)))
    }
}
