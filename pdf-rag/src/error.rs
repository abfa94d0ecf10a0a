//! Error types for the `pdf-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in ingestion and query operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing credential, unknown provider, or inconsistent parameters.
    ///
    /// Fatal at startup of the component that hit it.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A file or directory named by the caller does not exist.
    #[error("Not found: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A document had no extractable text.
    #[error("Empty input: {document} has no extractable text")]
    EmptyInput {
        /// Identifier of the skipped document.
        document: String,
    },

    /// A PDF file could not be read or parsed.
    #[error("PDF error ({}): {message}", path.display())]
    PdfError {
        /// The offending file.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while calling the embedding backend.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// One ingestion batch failed. Never aborts the overall run.
    #[error("Ingestion batch {batch} failed: {message}")]
    IngestionBatchError {
        /// 1-based batch number.
        batch: usize,
        /// A description of the failure.
        message: String,
    },

    /// Retrieval or query expansion failed.
    #[error("Query error: {0}")]
    QueryError(String),

    /// The text-generation backend failed.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
