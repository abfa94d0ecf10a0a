//! Configuration for ingestion, retrieval and the model providers.
//!
//! A [`RagConfig`] is built once (from defaults, the builder, or
//! [`RagConfig::from_env`]) and handed to every component constructor.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Which backend family serves embeddings and completions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Hosted OpenAI (or any OpenAI-compatible endpoint).
    #[default]
    OpenAI,
    /// A locally running Ollama server.
    Ollama,
}

impl std::str::FromStr for ModelProvider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(RagError::ConfigError(format!(
                "unknown LLM provider '{other}' (expected 'openai' or 'ollama')"
            ))),
        }
    }
}

/// Where collections are persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VectorBackend {
    /// JSON snapshots in a local directory.
    Local { directory: PathBuf },
    /// A Qdrant server (requires the `qdrant` feature).
    Qdrant { url: String },
}

impl Default for VectorBackend {
    fn default() -> Self {
        Self::Local { directory: PathBuf::from("./vector_store") }
    }
}

/// Model endpoints, credentials and generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub provider: ModelProvider,
    /// Credential for the hosted backend. Never serialized.
    #[serde(skip_serializing, default)]
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_embedding_model: String,
    /// Optional Matryoshka truncation for OpenAI embeddings.
    pub openai_embedding_dimensions: Option<usize>,
    pub openai_completion_model: String,
    pub ollama_base_url: String,
    pub ollama_embedding_model: String,
    pub ollama_completion_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on each embedding-backend reachability probe.
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_embedding_model: "text-embedding-3-large".to_string(),
            openai_embedding_dimensions: None,
            openai_completion_model: "gpt-3.5-turbo".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_embedding_model: "llama3.2:1b".to_string(),
            ollama_completion_model: "llama3.2:1b".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl ProviderConfig {
    /// The API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Maximum number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of results per similarity search.
    pub top_k: usize,
    /// Target chunks per ingestion batch.
    pub batch_size: usize,
    /// Ingestion worker count. `None` means `min(available parallelism, 8)`.
    pub max_workers: Option<usize>,
    /// Expand questions into alternative phrasings before retrieval.
    pub use_multi_query: bool,
    /// How many alternative questions to ask the model for.
    pub expansion_count: usize,
    pub collection_name: String,
    pub vector_backend: VectorBackend,
    /// Default directory for directory ingestion.
    pub pdf_directory: PathBuf,
    /// Dimension of the hash-based fallback embeddings.
    pub fallback_dimensions: usize,
    pub provider: ProviderConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            batch_size: 100,
            max_workers: None,
            use_multi_query: true,
            expansion_count: 3,
            collection_name: "pdf_documents".to_string(),
            vector_backend: VectorBackend::default(),
            pdf_directory: PathBuf::from("./data/pdfs"),
            fallback_dimensions: 384,
            provider: ProviderConfig::default(),
        }
    }
}

/// Cap on the default worker count.
const MAX_DEFAULT_WORKERS: usize = 8;

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a config from defaults overlaid with environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `LLM_PROVIDER` names an unknown
    /// provider or the resulting parameters fail validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = RagConfig::builder();

        if let Some(provider) = var("LLM_PROVIDER") {
            builder = builder.model_provider(provider.parse()?);
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            builder = builder.openai_api_key(key);
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            builder.config.provider.openai_base_url = url;
        }
        if let Some(model) = var("OPENAI_EMBEDDING_MODEL") {
            builder.config.provider.openai_embedding_model = model;
        }
        if let Some(model) = var("OPENAI_COMPLETION_MODEL") {
            builder.config.provider.openai_completion_model = model;
        }
        if let Some(url) = var("OLLAMA_BASE_URL") {
            builder.config.provider.ollama_base_url = url;
        }
        if let Some(model) = var("OLLAMA_EMBEDDING_MODEL") {
            builder.config.provider.ollama_embedding_model = model;
        }
        if let Some(model) = var("OLLAMA_COMPLETION_MODEL") {
            builder.config.provider.ollama_completion_model = model;
        }
        if let Some(url) = var("QDRANT_URL") {
            builder = builder.vector_backend(VectorBackend::Qdrant { url });
        } else if let Some(dir) = var("VECTOR_STORE_DIR") {
            builder = builder.vector_backend(VectorBackend::Local { directory: dir.into() });
        }
        if let Some(dir) = var("PDF_DIRECTORY") {
            builder = builder.pdf_directory(dir);
        }
        if let Some(name) = var("COLLECTION_NAME") {
            builder = builder.collection_name(name);
        }

        builder.build()
    }

    /// Resolved ingestion worker count.
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .min(MAX_DEFAULT_WORKERS)
        })
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of results per similarity search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = Some(workers);
        self
    }

    pub fn use_multi_query(mut self, enabled: bool) -> Self {
        self.config.use_multi_query = enabled;
        self
    }

    pub fn expansion_count(mut self, count: usize) -> Self {
        self.config.expansion_count = count;
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    pub fn vector_backend(mut self, backend: VectorBackend) -> Self {
        self.config.vector_backend = backend;
        self
    }

    /// Persist collections as JSON snapshots under `directory`.
    pub fn storage_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.vector_backend = VectorBackend::Local { directory: directory.into() };
        self
    }

    pub fn pdf_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.pdf_directory = directory.into();
        self
    }

    pub fn fallback_dimensions(mut self, dims: usize) -> Self {
        self.config.fallback_dimensions = dims;
        self
    }

    pub fn model_provider(mut self, provider: ModelProvider) -> Self {
        self.config.provider.provider = provider;
        self
    }

    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.provider.openai_api_key = Some(key.into());
        self
    }

    pub fn ollama_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.provider.ollama_base_url = url.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.provider.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.provider.max_tokens = max_tokens;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.provider.probe_timeout = timeout;
        self
    }

    /// Replace the whole provider section.
    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.config.provider = provider;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k`, `batch_size`, `max_workers`, `expansion_count` or
    ///   `fallback_dimensions` is zero
    /// - the collection name is blank
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if config.batch_size == 0 {
            return Err(RagError::ConfigError("batch_size must be greater than zero".to_string()));
        }
        if config.max_workers == Some(0) {
            return Err(RagError::ConfigError("max_workers must be greater than zero".to_string()));
        }
        if config.expansion_count == 0 {
            return Err(RagError::ConfigError(
                "expansion_count must be greater than zero".to_string(),
            ));
        }
        if config.fallback_dimensions == 0 {
            return Err(RagError::ConfigError(
                "fallback_dimensions must be greater than zero".to_string(),
            ));
        }
        if config.collection_name.trim().is_empty() {
            return Err(RagError::ConfigError("collection_name must not be empty".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.collection_name, "pdf_documents");
        assert!(config.use_multi_query);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(RagConfig::builder().max_workers(0).build().is_err());
        assert!(RagConfig::builder().batch_size(0).build().is_err());
        assert!(RagConfig::builder().fallback_dimensions(0).build().is_err());
    }

    #[test]
    fn default_worker_count_is_capped() {
        let config = RagConfig::default();
        let workers = config.worker_count();
        assert!((1..=MAX_DEFAULT_WORKERS).contains(&workers));
        assert_eq!(RagConfig::builder().max_workers(3).build().unwrap().worker_count(), 3);
    }

    #[test]
    fn env_overlay() {
        let vars = HashMap::from([
            ("LLM_PROVIDER", "Ollama"),
            ("OLLAMA_BASE_URL", "http://ollama:11434"),
            ("VECTOR_STORE_DIR", "/tmp/store"),
            ("OPENAI_API_KEY", "  "),
        ]);
        let config =
            RagConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.provider.provider, ModelProvider::Ollama);
        assert_eq!(config.provider.ollama_base_url, "http://ollama:11434");
        assert_eq!(
            config.vector_backend,
            VectorBackend::Local { directory: PathBuf::from("/tmp/store") }
        );
        assert_eq!(config.provider.api_key(), None);
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let err = RagConfig::from_lookup(|k| (k == "LLM_PROVIDER").then(|| "bard".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("bard"));
    }

    #[test]
    fn api_key_is_not_serialized() {
        let config = RagConfig::builder().openai_api_key("sk-secret").build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
