//! Embedding model interface

pub mod mock;
pub mod provider;

pub use mock::MockEmbeddingModel;
pub use provider::{utils, EmbeddingModel};
