//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full ingest-and-query workflow by
//! composing a [`Chunker`], an [`EmbeddingProvider`], a [`VectorStore`] and a
//! [`Generator`].
//!
//! Ingestion: load PDF pages → chunk → parallel embed + upsert.
//! Query: retrieve (optionally multi-query) → render prompt → generate.
//!
//! # Example
//!
//! ```rust,ignore
//! use pdf_rag::{QueryRequest, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::from_config(RagConfig::from_env()?).await?;
//! pipeline.ingest_file("data/pdfs/report.pdf").await?;
//! let response = pipeline.answer(QueryRequest::new("What changed in Q3?").with_sources(true)).await;
//! println!("{}", response.answer);
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::{RagConfig, VectorBackend};
use crate::document::{IngestRequest, IngestResponse, QueryRequest, QueryResponse, SearchResult, SourceDocument, SourceRef};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::expansion::QueryExpander;
use crate::fallback::EmbeddingChain;
use crate::generation::{GenerationEngine, Generator, generator_from_config};
use crate::ingest::{IngestionReport, ParallelIngestor};
use crate::loader::{collect_pdf_paths, load_files, load_pdf};
use crate::local::LocalVectorStore;
use crate::retrieval::{MultiQueryRetriever, Retriever, VectorRetriever};
use crate::vectorstore::VectorStore;

/// Maximum characters of chunk text reported per source.
pub const SNIPPET_CHARS: usize = 200;

/// Open the vector store named by `backend`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] for a Qdrant backend when the `qdrant`
/// feature is disabled, or the backend's own error if it cannot be opened.
pub async fn store_from_config(backend: &VectorBackend) -> Result<Arc<dyn VectorStore>> {
    match backend {
        VectorBackend::Local { directory } => Ok(Arc::new(LocalVectorStore::open(directory).await?)),
        VectorBackend::Qdrant { url } => {
            #[cfg(feature = "qdrant")]
            {
                Ok(Arc::new(crate::qdrant::QdrantVectorStore::new(url)?))
            }
            #[cfg(not(feature = "qdrant"))]
            {
                Err(RagError::ConfigError(format!(
                    "Qdrant backend at '{url}' requires the 'qdrant' feature"
                )))
            }
        }
    }
}

/// Distinct `(source, page)` pairs in retrieval order, each with a snippet of
/// the first chunk seen for it.
pub fn source_refs(results: &[SearchResult]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    results
        .iter()
        .filter(|r| seen.insert((r.chunk.source.as_str(), r.chunk.page)))
        .map(|r| SourceRef {
            content_snippet: r.chunk.text.chars().take(SNIPPET_CHARS).collect(),
            source_path: r.chunk.source.clone(),
            page: r.chunk.page,
        })
        .collect()
}

/// The RAG pipeline orchestrator.
///
/// Construct one with [`RagPipeline::from_config`] (resolves providers and
/// opens the store) or [`RagPipeline::builder`] (explicit components).
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    generation: Option<GenerationEngine>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Resolve every component from `config` and open the collection.
    ///
    /// The embedding backend is chosen once by [`EmbeddingChain::standard`].
    /// A generator that cannot be built does not stop ingestion; queries
    /// report the problem in their answer instead.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if no embedding backend is available
    /// or the existing collection was built with a different embedding
    /// dimension.
    pub async fn from_config(config: RagConfig) -> Result<Self> {
        let generator = generator_from_config(&config.provider)
            .inspect_err(|e| warn!(error = %e, "no generator available, queries will fail"))
            .ok();
        let embedding_provider = EmbeddingChain::standard().resolve(&config).await?;
        let vector_store = store_from_config(&config.vector_backend).await?;
        let chunker = Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?);

        let pipeline = Self::builder()
            .config(config)
            .embedding_provider(embedding_provider)
            .vector_store(vector_store)
            .chunker(chunker)
            .maybe_generator(generator)
            .build()?;
        pipeline.open_collection().await?;
        Ok(pipeline)
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// The generator, if one could be built.
    pub fn generator(&self) -> Option<&Arc<dyn Generator>> {
        self.generation.as_ref().map(GenerationEngine::generator)
    }

    fn generation(&self) -> Result<GenerationEngine> {
        match &self.generation {
            Some(engine) => Ok(engine.clone()),
            None => generator_from_config(&self.config.provider).map(GenerationEngine::new),
        }
    }

    /// Create the configured collection if missing, or check that an
    /// existing one matches the embedding dimension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] on a dimension mismatch.
    pub async fn open_collection(&self) -> Result<()> {
        let name = &self.config.collection_name;
        let dimensions = self.embedding_provider.dimensions();
        match self.vector_store.collection_dimensions(name).await? {
            Some(existing) if existing != dimensions => {
                error!(collection = %name, existing, dimensions, "embedding dimension mismatch");
                Err(RagError::ConfigError(format!(
                    "collection '{name}' holds {existing}-dimensional vectors but provider '{}' produces {dimensions}; \
                     use the original provider or a new collection",
                    self.embedding_provider.name()
                )))
            }
            Some(_) => Ok(()),
            None => self.vector_store.create_collection(name, dimensions).await,
        }
    }

    /// Drop the configured collection and create it empty.
    pub async fn reset_collection(&self) -> Result<()> {
        self.vector_store.delete_collection(&self.config.collection_name).await?;
        self.open_collection().await
    }

    /// Number of chunks in the configured collection.
    pub async fn chunk_count(&self) -> Result<usize> {
        self.vector_store.count(&self.config.collection_name).await
    }

    fn ingestor(&self) -> ParallelIngestor {
        ParallelIngestor::new(
            Arc::clone(&self.embedding_provider),
            Arc::clone(&self.vector_store),
            self.config.collection_name.clone(),
        )
        .with_batch_size(self.config.batch_size)
        .with_max_workers(self.config.worker_count())
    }

    /// Chunk `documents` and ingest the chunks in parallel batches.
    ///
    /// Documents without text are skipped. Batch failures are reported, not
    /// returned as errors.
    pub async fn ingest_documents(&self, documents: &[SourceDocument]) -> Result<IngestionReport> {
        self.open_collection().await?;
        let chunks = self.chunker.chunk_all(documents);
        info!(documents = documents.len(), chunks = chunks.len(), "chunked documents");
        Ok(self.ingestor().ingest(chunks).await)
    }

    /// Ingest one PDF file.
    ///
    /// # Errors
    ///
    /// [`RagError::NotFound`] for a missing path and [`RagError::PdfError`]
    /// for a file that is not a readable PDF. Both are raised before any
    /// chunk is written.
    pub async fn ingest_file(&self, path: impl AsRef<Path>) -> Result<IngestResponse> {
        let path = path.as_ref();
        info!(path = %path.display(), "ingesting file");
        let documents = load_pdf(path).await?;
        let report = self.ingest_documents(&documents).await?;
        Ok(ingest_response(&report, format!("document {}", path.display())))
    }

    /// Ingest every `*.pdf` directly inside `directory`.
    ///
    /// # Errors
    ///
    /// [`RagError::NotFound`] if the directory does not exist.
    pub async fn ingest_directory(&self, directory: impl AsRef<Path>) -> Result<IngestResponse> {
        let directory = directory.as_ref();
        let files = collect_pdf_paths(directory).await?;
        if files.is_empty() {
            warn!(directory = %directory.display(), "no PDF files found");
            return Ok(IngestResponse {
                success: false,
                message: format!("No PDF files found in directory {}", directory.display()),
                document_chunks: 0,
            });
        }

        let loaded = load_files(&files, self.config.worker_count()).await;
        let loaded_count = loaded.len();
        if loaded_count < files.len() {
            warn!(skipped = files.len() - loaded_count, "some PDF files could not be read");
        }
        let documents: Vec<SourceDocument> = loaded.into_iter().flatten().collect();
        let report = self.ingest_documents(&documents).await?;
        Ok(ingest_response(
            &report,
            format!("{loaded_count} PDF files from {}", directory.display()),
        ))
    }

    /// Dispatch an [`IngestRequest`].
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse> {
        match request {
            IngestRequest::File { file_path } => self.ingest_file(file_path).await,
            IngestRequest::Directory { directory_path } => self.ingest_directory(directory_path).await,
        }
    }

    /// The retriever used for queries.
    ///
    /// # Errors
    ///
    /// Multi-query retrieval needs a generator; without one this returns
    /// the [`RagError::ConfigError`] that prevented building it.
    pub fn retriever(&self, use_multi_query: bool) -> Result<Arc<dyn Retriever>> {
        let base: Arc<dyn Retriever> = Arc::new(
            VectorRetriever::new(
                Arc::clone(&self.embedding_provider),
                Arc::clone(&self.vector_store),
                self.config.collection_name.clone(),
            )
            .with_top_k(self.config.top_k),
        );
        if !use_multi_query {
            return Ok(base);
        }
        let expander = QueryExpander::new(Arc::clone(self.generation()?.generator()))
            .with_count(self.config.expansion_count);
        Ok(Arc::new(MultiQueryRetriever::new(base, expander)))
    }

    /// Answer a question. Failures come back as an `"An error occurred: ..."`
    /// answer.
    pub async fn query(&self, question: &str) -> String {
        let request = QueryRequest::new(question).with_multi_query(self.config.use_multi_query);
        self.answer(request).await.answer
    }

    /// Answer a question and list the sources used.
    pub async fn query_with_sources(&self, question: &str) -> QueryResponse {
        let request = QueryRequest::new(question)
            .with_sources(true)
            .with_multi_query(self.config.use_multi_query);
        self.answer(request).await
    }

    /// Serve a [`QueryRequest`]. Never fails: retrieval or generation errors
    /// are turned into the answer text, with an empty source list.
    pub async fn answer(&self, request: QueryRequest) -> QueryResponse {
        info!(question = %request.question, multi_query = request.use_multi_query, "received query");
        let outcome = self.retrieve_and_generate(&request).await;
        match (outcome, request.include_sources) {
            (Ok((answer, results)), true) => {
                QueryResponse { answer, sources: Some(source_refs(&results)) }
            }
            (Ok((answer, _)), false) => QueryResponse { answer, sources: None },
            (Err(e), include_sources) => {
                error!(error = %e, "error querying RAG pipeline");
                QueryResponse {
                    answer: format!("An error occurred: {e}"),
                    sources: include_sources.then(Vec::new),
                }
            }
        }
    }

    async fn retrieve_and_generate(
        &self,
        request: &QueryRequest,
    ) -> Result<(String, Vec<SearchResult>)> {
        let generation = self.generation()?;
        let retriever = self.retriever(request.use_multi_query)?;
        let results = retriever.retrieve(&request.question).await?;
        let answer = generation.answer(&request.question, &results).await?;
        Ok((answer, results))
    }
}

fn ingest_response(report: &IngestionReport, what: String) -> IngestResponse {
    let success = report.ingested_chunks > 0 && report.is_complete();
    let message = if success {
        format!("Successfully ingested {what}")
    } else if report.total_chunks == 0 {
        format!("No text could be extracted from {what}")
    } else {
        format!(
            "Ingested {} of {} chunks from {what}; {} of {} batches failed",
            report.ingested_chunks,
            report.total_chunks,
            report.failures.len(),
            report.batches
        )
    };
    IngestResponse { success, message, document_chunks: report.total_chunks }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding provider, vector store and chunker are required. `config`
/// defaults to [`RagConfig::default`]. Without a generator the pipeline can
/// ingest but its queries answer with a configuration error.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(config)
///     .embedding_provider(Arc::new(HashEmbeddingProvider::new(384)?))
///     .vector_store(Arc::new(InMemoryVectorStore::new()))
///     .chunker(Arc::new(RecursiveChunker::new(1000, 200)?))
///     .generator(Arc::new(my_generator))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    generator: Option<Arc<dyn Generator>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the text generator used for answers and query expansion.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set or clear the generator.
    pub fn maybe_generator(mut self, generator: Option<Arc<dyn Generator>>) -> Self {
        self.generator = generator;
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker =
            self.chunker.ok_or_else(|| RagError::ConfigError("chunker is required".to_string()))?;
        Ok(RagPipeline {
            config: self.config.unwrap_or_default(),
            embedding_provider,
            vector_store,
            chunker,
            generation: self.generator.map(GenerationEngine::new),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn hit(source: &str, page: u32, text: &str) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: format!("{source}-{page}-{text}"),
                text: text.to_string(),
                embedding: Vec::new(),
                source: source.to_string(),
                page,
                chunk_index: 0,
                start_index: 0,
                metadata: Default::default(),
                document_id: format!("{source}#page={page}"),
            },
            score: 1.0,
        }
    }

    #[test]
    fn sources_deduplicated_by_path_and_page() {
        let results =
            vec![hit("a.pdf", 1, "first"), hit("a.pdf", 1, "second"), hit("a.pdf", 2, "third"), hit("b.pdf", 1, "x")];
        let refs = source_refs(&results);
        let keys: Vec<_> = refs.iter().map(|r| (r.source_path.as_str(), r.page)).collect();
        assert_eq!(keys, vec![("a.pdf", 1), ("a.pdf", 2), ("b.pdf", 1)]);
        assert_eq!(refs[0].content_snippet, "first");
    }

    #[test]
    fn snippet_truncated_on_char_boundary() {
        let long = "é".repeat(300);
        let refs = source_refs(&[hit("a.pdf", 1, &long)]);
        assert_eq!(refs[0].content_snippet.chars().count(), SNIPPET_CHARS);
    }

    #[test]
    fn ingest_response_success_rules() {
        let ok = IngestionReport { total_chunks: 3, ingested_chunks: 3, batches: 1, failures: vec![] };
        assert!(ingest_response(&ok, "x".into()).success);

        let empty = IngestionReport::default();
        let response = ingest_response(&empty, "x".into());
        assert!(!response.success);
        assert_eq!(response.document_chunks, 0);

        let partial = IngestionReport {
            total_chunks: 4,
            ingested_chunks: 2,
            batches: 2,
            failures: vec![crate::ingest::BatchFailure { batch: 2, chunk_count: 2, error: "boom".into() }],
        };
        let response = ingest_response(&partial, "x".into());
        assert!(!response.success);
        assert_eq!(response.document_chunks, 4);
        assert!(response.message.contains("1 of 2 batches failed"));
    }

    #[test]
    fn builder_requires_components() {
        let err = RagPipeline::builder().build().err().unwrap();
        assert!(matches!(err, RagError::ConfigError(_)));
    }
}
