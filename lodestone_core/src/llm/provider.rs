use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::types::{LlmMetadata, Message, TokenDelta};
use crate::error::Result;

/// Stream of text deltas from a completion call
pub type TextStream = BoxStream<'static, Result<String>>;

/// Stream of structured deltas from a chat call
pub type DeltaStream = BoxStream<'static, Result<TokenDelta>>;

/// Trait representing a language model provider
///
/// Implementations wrap provider APIs. Every call takes a cancellation
/// token; a canceled call fails with `Error::Canceled` and streams close
/// after yielding that error.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate text from a prompt
    async fn complete(&self, ctx: &CancellationToken, prompt: &str) -> Result<String>;

    /// Generate text from a sequence of messages
    async fn chat(&self, ctx: &CancellationToken, messages: &[Message]) -> Result<String>;

    /// Generate a stream of text deltas from a prompt
    async fn stream(&self, ctx: &CancellationToken, prompt: &str) -> Result<TextStream>;

    /// Generate a stream of structured deltas from messages
    async fn stream_chat(
        &self,
        ctx: &CancellationToken,
        messages: &[Message],
    ) -> Result<DeltaStream>;

    /// Static capabilities of the model
    fn metadata(&self) -> LlmMetadata {
        LlmMetadata::default()
    }

    /// Whether the provider supports tool calling
    fn supports_tool_calling(&self) -> bool {
        false
    }
}
