//! Retrieval: single-query vector search and multi-query fan-out with merge.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::expansion::QueryExpander;
use crate::vectorstore::VectorStore;

/// Finds the chunks most relevant to a question.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Results ordered by descending score.
    async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>>;
}

/// Embeds the question and runs one similarity search.
#[derive(Clone)]
pub struct VectorRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
    top_k: usize,
}

impl VectorRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self { embedder, store, collection: collection.into(), top_k: 4 }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>> {
        let embedding = self.embedder.embed_query(question).await?;
        let results =
            self.store.similarity_search_with_score(&self.collection, &embedding, self.top_k).await?;
        debug!(question, results = results.len(), "vector search complete");
        Ok(results)
    }
}

/// Merge result lists from several searches.
///
/// Each chunk appears once with the highest score any list gave it. The
/// output is ordered by descending score; equal scores keep the order in
/// which their chunks were first seen.
pub fn merge_results(lists: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    let mut merged: IndexMap<String, SearchResult> = IndexMap::new();
    for result in lists.into_iter().flatten() {
        match merged.get_mut(&result.chunk.id) {
            Some(existing) if existing.score >= result.score => {}
            Some(existing) => existing.score = result.score,
            None => {
                merged.insert(result.chunk.id.clone(), result);
            }
        }
    }

    let mut results: Vec<SearchResult> = merged.into_values().collect();
    // sort_by is stable, so ties keep first-seen order.
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

/// Retrieves for the question and for model-generated rephrasings of it,
/// then merges the results.
///
/// Expansion failure is handled per call: the wrapped retriever answers
/// alone. A failed search for an alternative is dropped; a failed search for
/// the original question fails the call.
pub struct MultiQueryRetriever {
    inner: Arc<dyn Retriever>,
    expander: QueryExpander,
}

impl MultiQueryRetriever {
    pub fn new(inner: Arc<dyn Retriever>, expander: QueryExpander) -> Self {
        Self { inner, expander }
    }
}

#[async_trait]
impl Retriever for MultiQueryRetriever {
    async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>> {
        let alternatives = match self.expander.expand(question).await {
            Ok(alternatives) => alternatives,
            Err(e) => {
                warn!(error = %e, "query expansion failed, using the original question only");
                return self.inner.retrieve(question).await;
            }
        };
        info!(question, alternatives = ?alternatives, "generated alternative queries");

        let queries: Vec<&str> =
            std::iter::once(question).chain(alternatives.iter().map(String::as_str)).collect();
        let mut outcomes =
            join_all(queries.iter().map(|query| self.inner.retrieve(query))).await.into_iter();

        let original = outcomes
            .next()
            .ok_or_else(|| RagError::QueryError("no search was issued".to_string()))??;
        let mut lists = vec![original];
        for (query, outcome) in queries[1..].iter().zip(outcomes) {
            match outcome {
                Ok(results) => lists.push(results),
                Err(e) => warn!(query, error = %e, "alternative query search failed, skipping"),
            }
        }

        let merged = merge_results(lists);
        debug!(question, results = merged.len(), "merged multi-query results");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: id.to_string(),
                text: format!("text of {id}"),
                embedding: Vec::new(),
                source: "doc.pdf".to_string(),
                page: 1,
                chunk_index: 0,
                start_index: 0,
                metadata: Default::default(),
                document_id: "doc.pdf#page=1".to_string(),
            },
            score,
        }
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.id.as_str()).collect()
    }

    #[test]
    fn merge_keeps_highest_score() {
        let merged = merge_results(vec![
            vec![result("a", 0.5), result("b", 0.4)],
            vec![result("a", 0.9), result("c", 0.1)],
        ]);
        assert_eq!(ids(&merged), vec!["a", "b", "c"]);
        assert_eq!(merged[0].score, 0.9);
    }

    #[test]
    fn merge_ties_keep_first_seen_order() {
        let merged = merge_results(vec![
            vec![result("x", 0.5), result("y", 0.5)],
            vec![result("z", 0.5), result("x", 0.2)],
        ]);
        assert_eq!(ids(&merged), vec!["x", "y", "z"]);
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        assert!(merge_results(vec![vec![], vec![]]).is_empty());
    }
}
