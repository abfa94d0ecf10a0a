//! Document chunking.
//!
//! [`RecursiveChunker`] splits a page hierarchically (paragraphs, lines,
//! sentences, words, then raw characters) into pieces no longer than the
//! chunk size, then greedily merges the pieces back into chunks. After a
//! chunk is emitted, its trailing pieces totalling at most `chunk_overlap`
//! characters are carried into the next chunk.
//!
//! Chunks are always contiguous spans of the page text, so the page can be
//! rebuilt from its chunks with [`reconstruct_text`].

use std::collections::VecDeque;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::document::{Chunk, SourceDocument};
use crate::error::{RagError, Result};

/// Separators tried in order, coarsest first.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and position metadata but no
/// embeddings. Embeddings are attached later by the ingestion engine.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] if the document has no
    /// non-whitespace text.
    fn chunk(&self, document: &SourceDocument) -> Result<Vec<Chunk>>;

    /// Chunk every document, skipping (and logging) the empty ones.
    fn chunk_all(&self, documents: &[SourceDocument]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for document in documents {
            match self.chunk(document) {
                Ok(doc_chunks) => chunks.extend(doc_chunks),
                Err(e) => warn!(document.id = %document.id, error = %e, "skipping document"),
            }
        }
        chunks
    }
}

/// Splits text hierarchically with a bounded overlap between neighbours.
///
/// # Example
///
/// ```rust,ignore
/// use pdf_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&page)?;
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

/// Split `documents` with a fresh [`RecursiveChunker`], skipping empty pages.
pub fn chunk_documents(
    documents: &[SourceDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    Ok(RecursiveChunker::new(chunk_size, chunk_overlap)?.chunk_all(documents))
}

/// A contiguous piece of the page text.
#[derive(Debug, Clone, Copy)]
struct Span {
    /// Byte offsets into the page text.
    start: usize,
    end: usize,
    /// Character offset of `start`.
    char_start: usize,
    chars: usize,
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Recursively split `text` (located at `offset`/`char_offset` in the page)
/// into spans of at most `chunk_size` characters.
fn split_spans(
    text: &str,
    offset: usize,
    char_offset: usize,
    chunk_size: usize,
    separators: &[&str],
    out: &mut Vec<Span>,
) {
    let chars = text.chars().count();
    if chars <= chunk_size {
        if chars > 0 {
            out.push(Span { start: offset, end: offset + text.len(), char_start: char_offset, chars });
        }
        return;
    }

    let Some((separator, remaining)) = separators.split_first() else {
        split_by_chars(text, offset, char_offset, chunk_size, out);
        return;
    };

    let mut byte_pos = offset;
    let mut char_pos = char_offset;
    for segment in split_keeping_separator(text, separator) {
        split_spans(segment, byte_pos, char_pos, chunk_size, remaining, out);
        byte_pos += segment.len();
        char_pos += segment.chars().count();
    }
}

/// Last resort: cut at every `chunk_size`-th character.
fn split_by_chars(
    text: &str,
    offset: usize,
    char_offset: usize,
    chunk_size: usize,
    out: &mut Vec<Span>,
) {
    let mut span_start = 0;
    let mut span_chars = 0;
    let mut char_pos = char_offset;

    for (idx, _) in text.char_indices() {
        if span_chars == chunk_size {
            out.push(Span {
                start: offset + span_start,
                end: offset + idx,
                char_start: char_pos,
                chars: span_chars,
            });
            char_pos += span_chars;
            span_start = idx;
            span_chars = 0;
        }
        span_chars += 1;
    }

    if span_chars > 0 {
        out.push(Span {
            start: offset + span_start,
            end: offset + text.len(),
            char_start: char_pos,
            chars: span_chars,
        });
    }
}

/// Merge adjacent spans into windows of at most `chunk_size` characters,
/// carrying at most `chunk_overlap` trailing characters into the next window.
fn merge_spans(spans: &[Span], chunk_size: usize, chunk_overlap: usize) -> Vec<Span> {
    let mut windows = Vec::new();
    let mut current: VecDeque<Span> = VecDeque::new();
    let mut total = 0;

    for span in spans {
        if !current.is_empty() && total + span.chars > chunk_size {
            windows.push(join(&current));
            while total > chunk_overlap || (total > 0 && total + span.chars > chunk_size) {
                let Some(front) = current.pop_front() else { break };
                total -= front.chars;
            }
        }
        current.push_back(*span);
        total += span.chars;
    }

    if !current.is_empty() {
        windows.push(join(&current));
    }

    windows
}

fn join(spans: &VecDeque<Span>) -> Span {
    let first = spans[0];
    let last = spans[spans.len() - 1];
    Span {
        start: first.start,
        end: last.end,
        char_start: first.char_start,
        chars: spans.iter().map(|s| s.chars).sum(),
    }
}

fn chunk_id(document: &SourceDocument, start_index: usize, text: &str) -> String {
    let key = format!("{}\u{0}{}\u{0}{start_index}\u{0}{text}", document.source, document.page);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &SourceDocument) -> Result<Vec<Chunk>> {
        if document.text.trim().is_empty() {
            return Err(RagError::EmptyInput { document: document.id.clone() });
        }

        let mut spans = Vec::new();
        split_spans(&document.text, 0, 0, self.chunk_size, &SEPARATORS, &mut spans);
        let windows = merge_spans(&spans, self.chunk_size, self.chunk_overlap);

        let chunks: Vec<Chunk> = windows
            .into_iter()
            .enumerate()
            .map(|(i, window)| {
                let text = document.text[window.start..window.end].to_string();
                Chunk {
                    id: chunk_id(document, window.char_start, &text),
                    text,
                    embedding: Vec::new(),
                    source: document.source.clone(),
                    page: document.page,
                    chunk_index: i,
                    start_index: window.char_start,
                    metadata: document.metadata.clone(),
                    document_id: document.id.clone(),
                }
            })
            .collect();

        debug!(document.id = %document.id, chunk_count = chunks.len(), "chunked document");
        Ok(chunks)
    }
}

/// Rebuild page text from its chunks (in order) by dropping each chunk's
/// overlap with its predecessor.
pub fn reconstruct_text(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;

    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start_index);
        text.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.start_index + chunk.text.chars().count());
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> SourceDocument {
        SourceDocument::new("doc.pdf", 1, text)
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let chunker = RecursiveChunker::new(1000, 200).unwrap();
        let chunks = chunker.chunk(&page("A short page.")).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A short page.");
        assert_eq!(chunks[0].start_index, 0);
        assert_eq!(chunks[0].page, 1);
    }

    #[test]
    fn whitespace_only_document_is_empty_input() {
        let chunker = RecursiveChunker::new(100, 10).unwrap();
        let err = chunker.chunk(&page(" \n\n\t ")).unwrap_err();
        assert!(matches!(err, RagError::EmptyInput { .. }));
    }

    #[test]
    fn chunk_all_skips_empty_documents() {
        let chunker = RecursiveChunker::new(100, 10).unwrap();
        let docs = vec![page(""), SourceDocument::new("doc.pdf", 2, "second page")];
        let chunks = chunker.chunk_all(&docs);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 2);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let chunker = RecursiveChunker::new(50, 0).unwrap();
        let chunks = chunker.chunk(&page(&text)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{}\n\n", "a".repeat(40)));
        assert_eq!(chunks[1].text, "b".repeat(40));
    }

    #[test]
    fn words_overlap_between_chunks() {
        let text = "one two three four five six seven eight nine ten";
        let chunker = RecursiveChunker::new(20, 8).unwrap();
        let chunks = chunker.chunk(&page(text)).unwrap();
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev_end = pair[0].start_index + pair[0].text.chars().count();
            assert!(pair[1].start_index < prev_end, "expected overlap");
            assert!(prev_end - pair[1].start_index <= 8);
        }
        assert_eq!(reconstruct_text(&chunks), text);
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(250);
        let chunker = RecursiveChunker::new(100, 20).unwrap();
        let chunks = chunker.chunk(&page(&text)).unwrap();
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 100));
        assert_eq!(reconstruct_text(&chunks), text);
    }

    #[test]
    fn multibyte_text_never_splits_a_char() {
        let text = "héllo wörld ünïcödé ".repeat(20);
        let chunker = RecursiveChunker::new(30, 10).unwrap();
        let chunks = chunker.chunk(&page(&text)).unwrap();
        assert_eq!(reconstruct_text(&chunks), text);
    }

    #[test]
    fn ids_are_deterministic() {
        let chunker = RecursiveChunker::new(20, 5).unwrap();
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let a = chunker.chunk(&page(text)).unwrap();
        let b = chunker.chunk(&page(text)).unwrap();
        assert_eq!(a, b);
        let ids: std::collections::HashSet<_> = a.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), a.len());
    }

    #[test]
    fn invalid_overlap_rejected() {
        assert!(RecursiveChunker::new(10, 10).is_err());
        assert!(chunk_documents(&[], 5, 6).is_err());
    }
}
