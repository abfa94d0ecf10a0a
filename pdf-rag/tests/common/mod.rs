//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdf_rag::{
    Chunk, EmbeddingProvider, Generator, HashEmbeddingProvider, INSUFFICIENT_INFORMATION,
    RagError, Result,
};

/// A generator that answers from the prompt's context without a model.
///
/// Expansion prompts get a fixed numbered list; answer prompts get the first
/// context line containing `keyword`, or the insufficient-information reply.
pub struct ScriptedGenerator {
    pub keyword: String,
    pub alternatives: Vec<String>,
    pub calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            alternatives: vec![
                "Which city is the capital?".to_string(),
                "Where is the seat of government located?".to_string(),
            ],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_alternatives(mut self, alternatives: &[&str]) -> Self {
        self.alternatives = alternatives.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("different versions of the given user question") {
            return Ok(self
                .alternatives
                .iter()
                .enumerate()
                .map(|(i, q)| format!("{}. {q}", i + 1))
                .collect::<Vec<_>>()
                .join("\n"));
        }

        let context = prompt
            .split_once("Context:\n")
            .and_then(|(_, rest)| rest.split_once("\n\nQuestion:"))
            .map(|(context, _)| context)
            .unwrap_or_default();
        Ok(context
            .lines()
            .find(|line| line.contains(&self.keyword))
            .map(|line| line.trim().to_string())
            .unwrap_or_else(|| INSUFFICIENT_INFORMATION.to_string()))
    }
}

/// A generator whose every call fails.
pub struct BrokenGenerator;

#[async_trait]
impl Generator for BrokenGenerator {
    fn name(&self) -> &str {
        "broken"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::GenerationError {
            provider: "broken".to_string(),
            message: "model unavailable".to_string(),
        })
    }
}

/// Hash embeddings that fail for any batch containing `poison`.
pub struct FailingEmbedder {
    inner: HashEmbeddingProvider,
    poison: String,
}

impl FailingEmbedder {
    pub fn new(dimensions: usize, poison: &str) -> Self {
        Self { inner: HashEmbeddingProvider::new(dimensions).unwrap(), poison: poison.to_string() }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed_query(text).await
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains(&self.poison)) {
            return Err(RagError::EmbeddingError {
                provider: "failing".to_string(),
                message: "injected failure".to_string(),
            });
        }
        self.inner.embed_documents(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// A chunk without an embedding.
pub fn chunk(id: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        embedding: Vec::new(),
        source: "fixture.pdf".to_string(),
        page: 1,
        chunk_index: 0,
        start_index: 0,
        metadata: HashMap::new(),
        document_id: "fixture.pdf#page=1".to_string(),
    }
}

/// Write a PDF with one page per entry of `pages`; each line of a page is
/// its own text object.
pub fn write_pdf(path: &Path, pages: &[&[&str]]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![72.into(), (720 - 16 * i as i64).into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// The two-page fixture used by the end-to-end and fallback tests.
pub fn write_country_pdf(path: &Path) {
    write_pdf(
        path,
        &[
            &[
                "Example Country Overview",
                "The capital of Example Country is Exemplar City.",
                "It lies on the northern coast.",
            ],
            &[
                "Economy",
                "The main exports are timber, copper and fish.",
                "Tourism grows every year.",
            ],
        ],
    );
}

pub fn hash_embedder(dimensions: usize) -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashEmbeddingProvider::new(dimensions).unwrap())
}
