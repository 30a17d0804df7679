//! Language model interface
//!
//! The [`LanguageModel`] trait is the seam provider clients plug into;
//! this crate ships only the contract and a deterministic mock.

pub mod mock;
pub mod provider;
pub mod types;

pub use mock::MockLanguageModel;
pub use provider::{DeltaStream, LanguageModel, TextStream};
pub use types::{LlmMetadata, Message, Role, TokenDelta, ToolCall};
