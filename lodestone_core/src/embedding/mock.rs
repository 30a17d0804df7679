//! Mock embedding model for testing

use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::provider::EmbeddingModel;
use crate::cancellation::ensure_active;
use crate::error::{Error, Result};
use crate::node::Embedding;

/// Deterministic mock embedder
///
/// By default it derives a normalized byte-histogram embedding from the
/// input, so equal texts always embed equally and a chunk queried with
/// its own text scores 1.0. A queue of fixed embeddings can be supplied
/// instead for tests that need exact vectors.
pub struct MockEmbeddingModel {
    dimension: usize,
    fixed: Mutex<Vec<Embedding>>,
}

impl MockEmbeddingModel {
    /// Create a deterministic embedder with the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fixed: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that pops embeddings from a queue, in order
    pub fn with_embeddings(embeddings: Vec<Embedding>) -> Self {
        Self {
            dimension: embeddings.first().map(|e| e.len()).unwrap_or(0),
            fixed: Mutex::new(embeddings),
        }
    }

    fn derive(&self, text: &str) -> Embedding {
        let mut embedding = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            embedding[i % self.dimension] += f32::from(byte) / 255.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbeddingModel {
    async fn get_text_embedding(&self, ctx: &CancellationToken, text: &str) -> Result<Embedding> {
        ensure_active(ctx)?;

        let mut fixed = self.fixed.lock().unwrap();
        if !fixed.is_empty() {
            return Ok(fixed.remove(0));
        }
        drop(fixed);

        if self.dimension == 0 {
            return Err(Error::Provider("mock embedder has no embeddings left".to_string()));
        }
        Ok(self.derive(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::utils::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let mock = MockEmbeddingModel::new(8);
        let ctx = CancellationToken::new();

        let a = mock.get_text_embedding(&ctx, "same text").await.unwrap();
        let b = mock.get_text_embedding(&ctx, "same text").await.unwrap();
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let c = mock.get_text_embedding(&ctx, "different").await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_fixed_queue() {
        let mock = MockEmbeddingModel::with_embeddings(vec![
            vec![0.1, 0.2, 0.3],
            vec![0.4, 0.5, 0.6],
        ]);
        let ctx = CancellationToken::new();

        assert_eq!(
            mock.get_text_embedding(&ctx, "a").await.unwrap(),
            vec![0.1, 0.2, 0.3]
        );
        assert_eq!(
            mock.get_text_embedding(&ctx, "b").await.unwrap(),
            vec![0.4, 0.5, 0.6]
        );
        assert!(mock.get_text_embedding(&ctx, "c").await.is_err());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let mock = MockEmbeddingModel::new(4);
        let ctx = CancellationToken::new();
        ctx.cancel();
        assert!(matches!(
            mock.get_text_embedding(&ctx, "x").await,
            Err(Error::Canceled)
        ));
    }
}
