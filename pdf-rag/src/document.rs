//! Data types for pages, chunks, search results, and the request/response
//! values exchanged at the orchestration boundary.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Extracted text of one page of one PDF.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDocument {
    /// Unique identifier, `{source}#page={page}`.
    pub id: String,
    /// The page text.
    pub text: String,
    /// Path of the PDF the page came from.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    /// Key-value metadata (`file_name`, `total_pages`).
    pub metadata: HashMap<String, String>,
}

impl SourceDocument {
    /// Create a page document with an id derived from its source and page.
    pub fn new(source: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            id: format!("{source}#page={page}"),
            text: text.into(),
            source,
            page,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous span of a [`SourceDocument`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Deterministic identifier (UUIDv5 over source, page, offset and text).
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Path of the PDF the chunk came from.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    /// Position of the chunk in its page's chunk sequence.
    pub chunk_index: usize,
    /// Character offset of the chunk's first character in the page text.
    pub start_index: usize,
    /// Metadata inherited from the parent document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// The ID of the parent [`SourceDocument`].
    pub document_id: String,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity (higher is more relevant).
    pub score: f32,
}

/// A question posed at the orchestration boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub include_sources: bool,
    #[serde(default = "default_use_multi_query")]
    pub use_multi_query: bool,
}

fn default_use_multi_query() -> bool {
    true
}

impl QueryRequest {
    /// A request with sources off and multi-query on.
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), include_sources: false, use_multi_query: true }
    }

    pub fn with_sources(mut self, include: bool) -> Self {
        self.include_sources = include;
        self
    }

    pub fn with_multi_query(mut self, enabled: bool) -> Self {
        self.use_multi_query = enabled;
        self
    }
}

/// Where part of an answer came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    /// Leading characters of the chunk text.
    pub content_snippet: String,
    pub source_path: String,
    pub page: u32,
}

/// The answer to a [`QueryRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    /// Present only when sources were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
}

/// A request to ingest one PDF or every PDF in a directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IngestRequest {
    File { file_path: PathBuf },
    Directory { directory_path: PathBuf },
}

/// The outcome of an [`IngestRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    /// Number of chunks produced from the input.
    pub document_chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_request_deserializes_either_shape() {
        let file: IngestRequest = serde_json::from_str(r#"{"file_path": "a.pdf"}"#).unwrap();
        assert_eq!(file, IngestRequest::File { file_path: "a.pdf".into() });

        let dir: IngestRequest = serde_json::from_str(r#"{"directory_path": "pdfs"}"#).unwrap();
        assert_eq!(dir, IngestRequest::Directory { directory_path: "pdfs".into() });
    }

    #[test]
    fn query_response_omits_absent_sources() {
        let response = QueryResponse { answer: "42".into(), sources: None };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({ "answer": "42" }));
    }

    #[test]
    fn query_request_defaults_to_multi_query() {
        let request: QueryRequest = serde_json::from_str(r#"{"question": "why?"}"#).unwrap();
        assert!(request.use_multi_query);
        assert!(!request.include_sources);
    }
}
