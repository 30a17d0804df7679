//! Response synthesis
//!
//! A synthesizer turns a query plus retrieved nodes into an answer by
//! prompting a language model, either whole ([`EngineResponse`]) or as a
//! token stream ([`StreamingEngineResponse`]). Streams are tied to the
//! call's cancellation token: canceling yields one `Canceled` error and
//! closes the stream.

pub mod accumulate;
pub mod simple;

pub use accumulate::{AccumulateSynthesizer, CompactAccumulateSynthesizer};
pub use simple::SimpleSynthesizer;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use lodestone_core::{NodeWithScore, QueryBundle};

use crate::error::{RagError, Result};

/// Default question-answering prompt
pub const DEFAULT_QA_PROMPT: &str = "Context information is below.\n\
---------------------\n\
{context}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {query}\n\
Answer: ";

/// Stream of answer deltas
pub type ResponseStream = BoxStream<'static, Result<String>>;

/// A prompt with `{context}` and `{query}` slots
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn format(&self, context: &str, query: &str) -> String {
        self.template
            .replace("{context}", context)
            .replace("{query}", query)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_QA_PROMPT)
    }
}

/// A complete synthesized answer
#[derive(Debug, Clone)]
pub struct EngineResponse {
    pub response: String,
    pub source_nodes: Vec<NodeWithScore>,
}

/// A streaming answer; source nodes are available before the first delta
pub struct StreamingEngineResponse {
    pub source_nodes: Vec<NodeWithScore>,
    pub stream: ResponseStream,
}

impl StreamingEngineResponse {
    /// Drain the stream into a complete response
    pub async fn collect(mut self) -> Result<EngineResponse> {
        let mut response = String::new();
        while let Some(delta) = self.stream.next().await {
            response.push_str(&delta?);
        }
        Ok(EngineResponse {
            response,
            source_nodes: self.source_nodes,
        })
    }
}

/// Maps `(query, retrieved nodes)` to an answer
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
        nodes: Vec<NodeWithScore>,
    ) -> Result<EngineResponse>;

    async fn synthesize_stream(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
        nodes: Vec<NodeWithScore>,
    ) -> Result<StreamingEngineResponse>;
}

/// Tie a response stream to a cancellation token: after the token trips
/// the stream emits one `Canceled` error and closes
pub(crate) fn guard_response_stream(
    stream: ResponseStream,
    token: CancellationToken,
) -> ResponseStream {
    stream
        .scan(false, move |done, item| {
            if *done {
                return futures::future::ready(None);
            }
            if token.is_cancelled() {
                *done = true;
                return futures::future::ready(Some(Err(RagError::Canceled)));
            }
            futures::future::ready(Some(item))
        })
        .boxed()
}
