//! Simple ("stuff") synthesis: one LLM call over the packed context

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::cancellation::ensure_active;
use lodestone_core::llm::LanguageModel;
use lodestone_core::{MetadataMode, NodeWithScore, QueryBundle};

use crate::error::{RagError, Result};
use crate::synthesis::{
    guard_response_stream, EngineResponse, PromptTemplate, StreamingEngineResponse, Synthesizer,
};

/// Concatenates all source texts into one prompt and calls the model once
pub struct SimpleSynthesizer {
    llm: Arc<dyn LanguageModel>,
    prompt: PromptTemplate,
    context_separator: String,
}

impl SimpleSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            prompt: PromptTemplate::default(),
            context_separator: "\n\n".to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    fn build_prompt(&self, query: &QueryBundle, nodes: &[NodeWithScore]) -> String {
        let context = nodes
            .iter()
            .map(|r| r.node.content(MetadataMode::Llm))
            .collect::<Vec<_>>()
            .join(&self.context_separator);
        self.prompt.format(&context, &query.query)
    }
}

#[async_trait]
impl Synthesizer for SimpleSynthesizer {
    async fn synthesize(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
        nodes: Vec<NodeWithScore>,
    ) -> Result<EngineResponse> {
        ensure_active(ctx)?;
        let prompt = self.build_prompt(query, &nodes);
        debug!(sources = nodes.len(), "simple synthesis");
        let response = self.llm.complete(ctx, &prompt).await?;
        Ok(EngineResponse {
            response,
            source_nodes: nodes,
        })
    }

    async fn synthesize_stream(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
        nodes: Vec<NodeWithScore>,
    ) -> Result<StreamingEngineResponse> {
        ensure_active(ctx)?;
        let prompt = self.build_prompt(query, &nodes);
        let stream = self.llm.stream(ctx, &prompt).await?;
        let stream = stream.map(|r| r.map_err(RagError::from)).boxed();
        Ok(StreamingEngineResponse {
            source_nodes: nodes,
            stream: guard_response_stream(stream, ctx.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::llm::MockLanguageModel;
    use lodestone_core::Node;

    fn sources() -> Vec<NodeWithScore> {
        vec![
            NodeWithScore::new(Node::with_id("a", "Paris is the capital of France."), 0.9),
            NodeWithScore::new(Node::with_id("b", "Berlin is the capital of Germany."), 0.5),
        ]
    }

    #[tokio::test]
    async fn test_single_call_with_packed_context() {
        let llm = Arc::new(MockLanguageModel::new(vec!["Paris".to_string()]));
        let synthesizer = SimpleSynthesizer::new(llm);
        let ctx = CancellationToken::new();

        let response = synthesizer
            .synthesize(&ctx, &QueryBundle::new("capital of France?"), sources())
            .await
            .unwrap();
        assert_eq!(response.response, "Paris");
        assert_eq!(response.source_nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_prompt_contains_all_sources() {
        let synthesizer = SimpleSynthesizer::new(Arc::new(MockLanguageModel::empty()));
        let prompt = synthesizer.build_prompt(&QueryBundle::new("q"), &sources());
        assert!(prompt.contains("Paris is the capital of France."));
        assert!(prompt.contains("Berlin is the capital of Germany."));
        assert!(prompt.contains("Query: q"));
    }

    #[tokio::test]
    async fn test_streaming_reassembles() {
        let llm = Arc::new(MockLanguageModel::new(vec!["Paris, naturally".to_string()]));
        let synthesizer = SimpleSynthesizer::new(llm);
        let ctx = CancellationToken::new();

        let streaming = synthesizer
            .synthesize_stream(&ctx, &QueryBundle::new("q"), sources())
            .await
            .unwrap();
        assert_eq!(streaming.source_nodes.len(), 2);
        let response = streaming.collect().await.unwrap();
        assert_eq!(response.response, "Paris, naturally");
    }
}
