//! Mock language model for testing

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::provider::{DeltaStream, LanguageModel, TextStream};
use super::types::{LlmMetadata, Message, TokenDelta};
use crate::cancellation::{ensure_active, guard_stream};
use crate::error::Result;

const DEFAULT_RESPONSE: &str = "This is a mock response";

/// Mock language model with a queue of canned responses
///
/// Each call pops the next response; an empty queue falls back to a
/// default. Streaming splits the response into 5-character chunks.
pub struct MockLanguageModel {
    responses: Mutex<Vec<String>>,
}

impl MockLanguageModel {
    /// Create a mock with predefined responses
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    /// Create a mock that always answers with the default response
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Append a response to the queue
    pub fn add_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push(response.into());
    }

    fn next_response(&self) -> String {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            DEFAULT_RESPONSE.to_string()
        } else {
            responses.remove(0)
        }
    }

    fn chunked(response: &str) -> Vec<String> {
        response
            .chars()
            .collect::<Vec<_>>()
            .chunks(5)
            .map(|c| c.iter().collect::<String>())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, ctx: &CancellationToken, _prompt: &str) -> Result<String> {
        ensure_active(ctx)?;
        Ok(self.next_response())
    }

    async fn chat(&self, ctx: &CancellationToken, _messages: &[Message]) -> Result<String> {
        ensure_active(ctx)?;
        Ok(self.next_response())
    }

    async fn stream(&self, ctx: &CancellationToken, _prompt: &str) -> Result<TextStream> {
        ensure_active(ctx)?;
        let chunks = Self::chunked(&self.next_response());
        let inner = stream::iter(chunks).map(Ok).boxed();
        Ok(guard_stream(inner, ctx.clone()))
    }

    async fn stream_chat(
        &self,
        ctx: &CancellationToken,
        _messages: &[Message],
    ) -> Result<DeltaStream> {
        ensure_active(ctx)?;
        let chunks = Self::chunked(&self.next_response());
        let last = chunks.len().saturating_sub(1);
        let deltas: Vec<TokenDelta> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                if i == last {
                    TokenDelta::final_delta(chunk, "stop")
                } else {
                    TokenDelta::new(chunk)
                }
            })
            .collect();
        let inner = stream::iter(deltas).map(Ok).boxed();
        Ok(guard_stream(inner, ctx.clone()))
    }

    fn metadata(&self) -> LlmMetadata {
        LlmMetadata {
            model_name: "mock".to_string(),
            ..LlmMetadata::default()
        }
    }
}
