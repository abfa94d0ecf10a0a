//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, Ollama, the
/// hash fallback) behind a unified async interface. The default
/// [`embed_documents`](EmbeddingProvider::embed_documents) implementation
/// calls [`embed_query`](EmbeddingProvider::embed_query) sequentially;
/// backends that support native batching should override it.
///
/// Every vector a provider returns has [`dimensions`](EmbeddingProvider::dimensions)
/// entries. Vectors from different providers are not comparable, so one
/// collection must only ever be fed by one provider.
///
/// # Example
///
/// ```rust,ignore
/// use pdf_rag::EmbeddingProvider;
///
/// let embedding = provider.embed_query("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short label used in logs and errors.
    fn name(&self) -> &str;

    /// Generate an embedding vector for a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of texts, in input order.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed_query(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Scale `vector` to unit L2 norm in place. Zero vectors are left untouched.
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
