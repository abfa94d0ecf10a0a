//! Embedding backend selection when no real backend is reachable.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedGenerator, write_country_pdf};
use pdf_rag::{EmbeddingChain, LocalVectorStore, RagConfig, RagPipeline, RecursiveChunker};

const FALLBACK_DIMS: usize = 48;

/// No API key and nothing listening on the Ollama port.
fn offline_config(dir: &std::path::Path) -> RagConfig {
    RagConfig::builder()
        .ollama_base_url("http://127.0.0.1:9")
        .probe_timeout(Duration::from_millis(500))
        .fallback_dimensions(FALLBACK_DIMS)
        .storage_directory(dir.join("store"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn unreachable_backends_resolve_to_hash_provider() {
    let dir = tempfile::tempdir().unwrap();
    let provider = EmbeddingChain::standard().resolve(&offline_config(dir.path())).await.unwrap();
    assert_eq!(provider.name(), "hash");
    assert_eq!(provider.dimensions(), FALLBACK_DIMS);
}

#[tokio::test]
async fn ingestion_completes_with_fallback_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("country.pdf");
    write_country_pdf(&pdf);

    let config = offline_config(dir.path());
    let embedder = EmbeddingChain::standard().resolve(&config).await.unwrap();
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_store(Arc::new(LocalVectorStore::open(dir.path().join("store")).await.unwrap()))
        .chunker(Arc::new(RecursiveChunker::new(1000, 200).unwrap()))
        .generator(Arc::new(ScriptedGenerator::new("capital")))
        .build()
        .unwrap();

    let response = pipeline.ingest_file(&pdf).await.unwrap();
    assert!(response.success, "{}", response.message);
    assert_uniform_snapshot(dir.path(), response.document_chunks);
}

#[tokio::test]
async fn offline_pipeline_ingests_and_reports_missing_generator() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("country.pdf");
    write_country_pdf(&pdf);

    // The default provider is OpenAI and no key is set.
    let pipeline = RagPipeline::from_config(offline_config(dir.path())).await.unwrap();
    assert_eq!(pipeline.embedding_provider().name(), "hash");
    assert!(pipeline.generator().is_none());

    let response = pipeline.ingest_file(&pdf).await.unwrap();
    assert!(response.success, "{}", response.message);
    assert_uniform_snapshot(dir.path(), response.document_chunks);

    let answer = pipeline.query_with_sources("What is the capital of Example Country?").await;
    assert!(answer.answer.starts_with("An error occurred: "), "answer was: {}", answer.answer);
    assert!(answer.answer.contains("OPENAI_API_KEY"));
    assert_eq!(answer.sources, Some(Vec::new()));
}

/// Every persisted vector has the fallback dimension.
fn assert_uniform_snapshot(dir: &std::path::Path, expected_chunks: usize) {
    let snapshot: serde_json::Value = serde_json::from_slice(
        &std::fs::read(dir.join("store").join("pdf_documents.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot["dimensions"], FALLBACK_DIMS);
    let chunks = snapshot["chunks"].as_object().unwrap();
    assert_eq!(chunks.len(), expected_chunks);
    for chunk in chunks.values() {
        assert_eq!(chunk["embedding"].as_array().unwrap().len(), FALLBACK_DIMS);
    }
}
