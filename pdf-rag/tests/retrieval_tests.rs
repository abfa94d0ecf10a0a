//! Multi-query retrieval against an in-memory collection.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use common::{BrokenGenerator, ScriptedGenerator, chunk, hash_embedder};
use pdf_rag::{
    InMemoryVectorStore, MultiQueryRetriever, ParallelIngestor, QueryExpander, RagError, Result,
    Retriever, SearchResult, VectorRetriever, VectorStore,
};

const DIMS: usize = 64;

const FACTS: &[&str] = &[
    "The capital of Example Country is Exemplar City.",
    "Exemplar City hosts the national parliament and the seat of government.",
    "The northern coast is known for fishing villages.",
    "Copper mining is the largest export industry.",
    "Timber is harvested in the southern forests.",
    "The national football team plays in red.",
    "Tourism grows every year in the coastal region.",
    "The currency is the example dollar.",
    "Winters are mild and summers are dry.",
    "The parliament meets twice a year in spring and autumn.",
];

async fn seeded_store() -> Arc<InMemoryVectorStore> {
    let store = Arc::new(InMemoryVectorStore::new());
    store.create_collection("docs", DIMS).await.unwrap();
    let chunks = FACTS.iter().enumerate().map(|(i, text)| chunk(&format!("fact-{i}"), text)).collect();
    let report = ParallelIngestor::new(hash_embedder(DIMS), store.clone(), "docs").ingest(chunks).await;
    assert!(report.is_complete());
    store
}

fn base(store: Arc<InMemoryVectorStore>, top_k: usize) -> Arc<dyn Retriever> {
    Arc::new(VectorRetriever::new(hash_embedder(DIMS), store, "docs").with_top_k(top_k))
}

fn ids(results: &[SearchResult]) -> HashSet<String> {
    results.iter().map(|r| r.chunk.id.clone()).collect()
}

#[tokio::test]
async fn single_query_respects_top_k_and_order() {
    let store = seeded_store().await;
    let results = base(store, 3).retrieve("What is the capital of Example Country?").await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(results[0].chunk.id, "fact-0");
}

/// With a working expander, multi-query results contain every single-query
/// result.
#[tokio::test]
async fn multi_query_is_a_superset_of_single_query() {
    let store = seeded_store().await;
    let question = "What is the capital of Example Country?";

    let single = base(store.clone(), 2).retrieve(question).await.unwrap();
    let generator = Arc::new(ScriptedGenerator::new("capital").with_alternatives(&[
        "Where does the parliament meet?",
        "Which industry exports the most?",
    ]));
    let multi = MultiQueryRetriever::new(base(store, 2), QueryExpander::new(generator.clone()));
    let merged = multi.retrieve(question).await.unwrap();

    assert!(ids(&single).is_subset(&ids(&merged)));
    assert!(merged.len() > single.len());
    assert!(merged.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(ids(&merged).len(), merged.len(), "merged results must be unique");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_expansion_falls_back_to_single_query() {
    let store = seeded_store().await;
    let question = "Which industry exports copper?";

    let single = base(store.clone(), 4).retrieve(question).await.unwrap();
    let multi = MultiQueryRetriever::new(base(store, 4), QueryExpander::new(Arc::new(BrokenGenerator)));
    let fallback = multi.retrieve(question).await.unwrap();

    let single_ids: Vec<_> = single.iter().map(|r| r.chunk.id.clone()).collect();
    let fallback_ids: Vec<_> = fallback.iter().map(|r| r.chunk.id.clone()).collect();
    assert_eq!(single_ids, fallback_ids);
}

/// Fails searches for every question except the original.
struct OriginalOnly {
    inner: Arc<dyn Retriever>,
    original: String,
}

#[async_trait]
impl Retriever for OriginalOnly {
    async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>> {
        if question == self.original {
            self.inner.retrieve(question).await
        } else {
            Err(RagError::QueryError("search backend hiccup".to_string()))
        }
    }
}

#[tokio::test]
async fn failed_alternative_searches_are_skipped() {
    let store = seeded_store().await;
    let question = "What is the currency?";
    let flaky = Arc::new(OriginalOnly { inner: base(store.clone(), 3), original: question.to_string() });

    let multi = MultiQueryRetriever::new(flaky, QueryExpander::new(Arc::new(ScriptedGenerator::new("x"))));
    let results = multi.retrieve(question).await.unwrap();

    let single = base(store, 3).retrieve(question).await.unwrap();
    assert_eq!(ids(&results), ids(&single));
}

#[tokio::test]
async fn failed_original_search_is_an_error() {
    let store = seeded_store().await;
    let flaky = Arc::new(OriginalOnly { inner: base(store, 3), original: "something else".to_string() });
    let multi = MultiQueryRetriever::new(flaky, QueryExpander::new(Arc::new(ScriptedGenerator::new("x"))));
    assert!(multi.retrieve("What is the currency?").await.is_err());
}
