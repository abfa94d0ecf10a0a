//! Dependency-free fallback embeddings.
//!
//! [`HashEmbeddingProvider`] keeps the system usable when no real embedding
//! backend is reachable. Each lowercase word is hashed with SHA-256; the
//! digest picks a bucket and a sign, and the bucket counts are normalised to
//! unit length. Texts sharing words therefore land close together, which is
//! enough for lexical retrieval but carries no semantics.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::embedding::{EmbeddingProvider, normalize};
use crate::error::{RagError, Result};

/// Deterministic word-hashing embeddings of a fixed dimension.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::ConfigError(
                "hash embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    /// Embed synchronously. Never fails.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let mut words = lowered.split_whitespace().peekable();

        if words.peek().is_none() {
            // No words: a fixed unit vector keeps the output normalised.
            self.accumulate(&mut vector, "");
        }
        for word in words {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            self.accumulate(&mut vector, word);
        }

        normalize(&mut vector);
        if vector.iter().all(|x| *x == 0.0) {
            // Every word cancelled out; fall back to the empty-word bucket.
            self.accumulate(&mut vector, "");
            normalize(&mut vector);
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], word: &str) {
        let digest = Sha256::digest(word.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
