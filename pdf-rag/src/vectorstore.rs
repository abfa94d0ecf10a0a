//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;

use crate::document::{Chunk, SearchResult};
use crate::error::Result;

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of [`Chunk`]s and support
/// upserting and searching by vector similarity. Implementations must be
/// safe to call concurrently: ingestion workers upsert in parallel while
/// queries search, and no locking happens above this trait.
///
/// # Example
///
/// ```rust,ignore
/// use pdf_rag::{LocalVectorStore, VectorStore};
///
/// let store = LocalVectorStore::open("./vector_store").await?;
/// store.create_collection("docs", 384).await?;
/// store.upsert("docs", &chunks).await?;
/// let results = store.similarity_search_with_score("docs", &query_embedding, 4).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Dimension recorded for the collection, or `None` if it does not exist.
    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>>;

    /// Number of chunks stored in the collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Upsert chunks into a collection, keyed by chunk id.
    ///
    /// Chunks must have embeddings of the collection's dimension.
    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()>;

    /// Return the `k` most similar chunks with their scores, ordered by
    /// descending similarity.
    async fn similarity_search_with_score(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Like [`similarity_search_with_score`](VectorStore::similarity_search_with_score)
    /// without the scores.
    async fn similarity_search(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<Chunk>> {
        let results = self.similarity_search_with_score(collection, embedding, k).await?;
        Ok(results.into_iter().map(|r| r.chunk).collect())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Score every chunk against `embedding` and keep the best `k`.
///
/// The returned chunks carry no embedding; callers only need the text and
/// position metadata.
pub(crate) fn rank<'a>(
    chunks: impl Iterator<Item = &'a Chunk>,
    embedding: &[f32],
    k: usize,
) -> Vec<SearchResult> {
    let mut scored: Vec<(f32, &Chunk)> =
        chunks.map(|chunk| (cosine_similarity(&chunk.embedding, embedding), chunk)).collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.1.id.cmp(&b.1.id))
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(score, chunk)| SearchResult {
            chunk: Chunk { embedding: Vec::new(), ..chunk.clone() },
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
