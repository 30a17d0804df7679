//! Accumulating synthesis: one LLM call per chunk, answers joined
//!
//! [`AccumulateSynthesizer`] prompts the model once per source node and
//! joins the answers with a separator. [`CompactAccumulateSynthesizer`]
//! first packs the source texts into token-bounded super-chunks, trading
//! per-chunk granularity for fewer model calls.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::cancellation::ensure_active;
use lodestone_core::llm::LanguageModel;
use lodestone_core::{MetadataMode, NodeWithScore, QueryBundle};

use crate::error::{RagError, Result};
use crate::splitter::Tokenizer;
use crate::synthesis::{
    guard_response_stream, EngineResponse, PromptTemplate, ResponseStream,
    StreamingEngineResponse, Synthesizer,
};

/// Default separator between per-chunk answers
pub const DEFAULT_RESPONSE_SEPARATOR: &str = "\n---------------------\n";

/// Run the prompts in order and join the answers
async fn run_prompts(
    llm: &dyn LanguageModel,
    ctx: &CancellationToken,
    prompts: &[String],
    separator: &str,
) -> Result<String> {
    let mut responses = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        ensure_active(ctx)?;
        responses.push(llm.complete(ctx, prompt).await?);
    }
    Ok(responses.join(separator))
}

/// Stream the prompts in order, inserting the separator between answers
fn stream_prompts(
    llm: Arc<dyn LanguageModel>,
    ctx: &CancellationToken,
    prompts: Vec<String>,
    separator: String,
) -> ResponseStream {
    let call_ctx = ctx.clone();
    let stream = stream::iter(prompts.into_iter().enumerate())
        .then(move |(i, prompt)| {
            let llm = Arc::clone(&llm);
            let ctx = call_ctx.clone();
            let separator = separator.clone();
            async move {
                let mut parts: Vec<ResponseStream> = Vec::new();
                if i > 0 {
                    parts.push(stream::iter(vec![Ok(separator)]).boxed());
                }
                match llm.stream(&ctx, &prompt).await {
                    Ok(inner) => {
                        parts.push(inner.map(|r| r.map_err(RagError::from)).boxed());
                    }
                    Err(err) => {
                        parts.push(stream::iter(vec![Err(RagError::from(err))]).boxed());
                    }
                }
                stream::iter(parts).flatten().boxed()
            }
        })
        .flatten()
        .boxed();
    guard_response_stream(stream, ctx.clone())
}

/// One model call per source node
pub struct AccumulateSynthesizer {
    llm: Arc<dyn LanguageModel>,
    prompt: PromptTemplate,
    response_separator: String,
}

impl AccumulateSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            prompt: PromptTemplate::default(),
            response_separator: DEFAULT_RESPONSE_SEPARATOR.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_response_separator(mut self, separator: impl Into<String>) -> Self {
        self.response_separator = separator.into();
        self
    }

    fn prompts(&self, query: &QueryBundle, nodes: &[NodeWithScore]) -> Vec<String> {
        nodes
            .iter()
            .map(|r| {
                self.prompt
                    .format(&r.node.content(MetadataMode::Llm), &query.query)
            })
            .collect()
    }
}

#[async_trait]
impl Synthesizer for AccumulateSynthesizer {
    async fn synthesize(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
        nodes: Vec<NodeWithScore>,
    ) -> Result<EngineResponse> {
        ensure_active(ctx)?;
        let prompts = self.prompts(query, &nodes);
        debug!(calls = prompts.len(), "accumulate synthesis");
        let response = run_prompts(
            self.llm.as_ref(),
            ctx,
            &prompts,
            &self.response_separator,
        )
        .await?;
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
        let prompts = self.prompts(query, &nodes);
        let stream = stream_prompts(
            Arc::clone(&self.llm),
            ctx,
            prompts,
            self.response_separator.clone(),
        );
        Ok(StreamingEngineResponse {
            source_nodes: nodes,
            stream,
        })
    }
}

/// Accumulate over greedily packed super-chunks
pub struct CompactAccumulateSynthesizer {
    llm: Arc<dyn LanguageModel>,
    prompt: PromptTemplate,
    response_separator: String,
    chunk_separator: String,
    max_chunk_size: usize,
    tokenizer: Tokenizer,
}

impl CompactAccumulateSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, max_chunk_size: usize) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(RagError::Configuration(
                "max_chunk_size must be positive".to_string(),
            ));
        }
        Ok(Self {
            llm,
            prompt: PromptTemplate::default(),
            response_separator: DEFAULT_RESPONSE_SEPARATOR.to_string(),
            chunk_separator: "\n\n".to_string(),
            max_chunk_size,
            tokenizer: Tokenizer::cl100k()?,
        })
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    /// Greedily pack texts into super-chunks within the token budget
    ///
    /// A single text over the budget becomes its own super-chunk.
    fn pack(&self, texts: Vec<String>) -> Vec<String> {
        let mut packed: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;
        let separator_tokens = self.tokenizer.count(&self.chunk_separator);

        for text in texts {
            let tokens = self.tokenizer.count(&text);
            if current.is_empty() {
                current = text;
                current_tokens = tokens;
                continue;
            }
            if current_tokens + separator_tokens + tokens > self.max_chunk_size {
                packed.push(std::mem::take(&mut current));
                current = text;
                current_tokens = tokens;
            } else {
                current.push_str(&self.chunk_separator);
                current.push_str(&text);
                current_tokens += separator_tokens + tokens;
            }
        }
        if !current.is_empty() {
            packed.push(current);
        }
        packed
    }

    fn prompts(&self, query: &QueryBundle, nodes: &[NodeWithScore]) -> Vec<String> {
        let texts: Vec<String> = nodes
            .iter()
            .map(|r| r.node.content(MetadataMode::Llm))
            .collect();
        self.pack(texts)
            .into_iter()
            .map(|chunk| self.prompt.format(&chunk, &query.query))
            .collect()
    }
}

#[async_trait]
impl Synthesizer for CompactAccumulateSynthesizer {
    async fn synthesize(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
        nodes: Vec<NodeWithScore>,
    ) -> Result<EngineResponse> {
        ensure_active(ctx)?;
        let prompts = self.prompts(query, &nodes);
        debug!(calls = prompts.len(), sources = nodes.len(), "compact accumulate synthesis");
        let response = run_prompts(
            self.llm.as_ref(),
            ctx,
            &prompts,
            &self.response_separator,
        )
        .await?;
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
        let prompts = self.prompts(query, &nodes);
        let stream = stream_prompts(
            Arc::clone(&self.llm),
            ctx,
            prompts,
            self.response_separator.clone(),
        );
        Ok(StreamingEngineResponse {
            source_nodes: nodes,
            stream,
        })
    }
}
