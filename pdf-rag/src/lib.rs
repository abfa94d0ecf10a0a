//! # pdf-rag
//!
//! Question answering over a collection of PDF documents.
//!
//! ## Overview
//!
//! PDFs are split into overlapping chunks, embedded, and stored in a
//! persistent vector collection. Questions are optionally rephrased by the
//! model into several alternatives, the collection is searched for each,
//! and the merged context is handed to the model with an instruction to
//! answer only from it.
//!
//! - [`RecursiveChunker`] - hierarchical splitter with bounded overlap
//! - [`EmbeddingChain`] - picks an embedding backend once at startup
//!   (OpenAI, then Ollama, then [`HashEmbeddingProvider`])
//! - [`ParallelIngestor`] - batched, concurrent embed + upsert with
//!   per-batch failure isolation
//! - [`LocalVectorStore`] / [`InMemoryVectorStore`] - vector stores
//! - [`MultiQueryRetriever`] - query expansion and result merging
//! - [`RagPipeline`] - the orchestrator tying it together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pdf_rag::{QueryRequest, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::from_config(RagConfig::from_env()?).await?;
//! let response = pipeline.ingest_directory("./data/pdfs").await?;
//! println!("{} ({} chunks)", response.message, response.document_chunks);
//!
//! let answer = pipeline.answer(QueryRequest::new("What is the refund policy?").with_sources(true)).await;
//! println!("{}", answer.answer);
//! ```
//!
//! ## Features
//!
//! - `openai` (default) - OpenAI embeddings and chat completions
//! - `ollama` (default) - local Ollama embeddings and completions
//! - `qdrant` - Qdrant vector store backend

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod expansion;
pub mod fallback;
pub mod generation;
pub mod hashed;
pub mod ingest;
pub mod inmemory;
pub mod loader;
pub mod local;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod retrieval;
pub mod vectorstore;

pub use chunking::{Chunker, RecursiveChunker, chunk_documents, reconstruct_text};
pub use config::{ModelProvider, ProviderConfig, RagConfig, RagConfigBuilder, VectorBackend};
pub use document::{
    Chunk, IngestRequest, IngestResponse, QueryRequest, QueryResponse, SearchResult,
    SourceDocument, SourceRef,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use expansion::{QueryExpander, parse_expansion};
pub use fallback::{EmbeddingChain, EmbeddingStrategy, HashStrategy};
#[cfg(feature = "ollama")]
pub use fallback::OllamaStrategy;
#[cfg(feature = "openai")]
pub use fallback::OpenAIStrategy;
pub use generation::{GenerationEngine, Generator, INSUFFICIENT_INFORMATION, render_prompt};
pub use hashed::HashEmbeddingProvider;
pub use ingest::{BatchFailure, IngestionReport, ParallelIngestor, partition_batches};
pub use inmemory::InMemoryVectorStore;
pub use loader::{collect_pdf_paths, load_directory, load_files, load_pdf};
pub use local::LocalVectorStore;
#[cfg(feature = "ollama")]
pub use ollama::{OllamaEmbeddingProvider, OllamaGenerator};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatGenerator, OpenAIEmbeddingProvider};
pub use pipeline::{RagPipeline, RagPipelineBuilder};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
pub use retrieval::{MultiQueryRetriever, Retriever, VectorRetriever, merge_results};
pub use vectorstore::VectorStore;
