use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::node::Embedding;

/// Provider for generating embeddings from text
///
/// Implementations wrap provider APIs. Calls take a cancellation token
/// and fail with `Error::Canceled` once it trips.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a piece of document text
    async fn get_text_embedding(&self, ctx: &CancellationToken, text: &str) -> Result<Embedding>;

    /// Embed a query; defaults to the text embedding
    async fn get_query_embedding(&self, ctx: &CancellationToken, query: &str) -> Result<Embedding> {
        self.get_text_embedding(ctx, query).await
    }

    /// Embed multiple texts in input order
    async fn get_text_embedding_batch(
        &self,
        ctx: &CancellationToken,
        texts: &[String],
    ) -> Result<Vec<Embedding>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.get_text_embedding(ctx, text).await?);
        }
        Ok(results)
    }
}

/// Utility functions for embeddings
pub mod utils {
    /// Compute cosine similarity between two vectors
    ///
    /// Mismatched lengths and zero vectors score 0.0.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let mut dot = 0.0;
        let mut norm_a = 0.0;
        let mut norm_b = 0.0;
        for i in 0..a.len() {
            dot += a[i] * b[i];
            norm_a += a[i] * a[i];
            norm_b += b[i] * b[i];
        }

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::utils::cosine_similarity;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        let similarity = cosine_similarity(&a, &b);
        assert!((similarity - 0.9746318).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![0.5, 0.5, 0.5];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        let a = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &a), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0, 0.0], &a), 0.0);
    }
}
