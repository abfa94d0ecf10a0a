//! Init-time selection of an embedding backend.
//!
//! [`EmbeddingChain`] holds an ordered list of [`EmbeddingStrategy`]s and
//! resolves it once: the first strategy whose backend initializes (and
//! answers a probe) wins. The chain is never consulted again, so a failure
//! in a later embedding call surfaces as [`RagError::EmbeddingError`]
//! instead of silently switching to a provider with a different vector space.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::hashed::HashEmbeddingProvider;

/// One way of obtaining an embedding provider.
#[async_trait]
pub trait EmbeddingStrategy: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Build and verify a provider, or explain why this backend is unusable.
    async fn initialize(&self, config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>>;
}

/// Bound a probe by the configured timeout.
#[cfg_attr(not(any(feature = "openai", feature = "ollama")), allow(dead_code))]
async fn with_probe_timeout<T>(
    backend: &str,
    timeout: Duration,
    probe: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, probe).await.map_err(|_| RagError::EmbeddingError {
        provider: backend.to_string(),
        message: format!("no response within {timeout:?}"),
    })?
}

/// Hosted OpenAI embeddings. Requires an API key.
#[cfg(feature = "openai")]
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAIStrategy;

#[cfg(feature = "openai")]
#[async_trait]
impl EmbeddingStrategy for OpenAIStrategy {
    fn name(&self) -> &str {
        "openai"
    }

    async fn initialize(&self, config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        let settings = &config.provider;
        let key = settings
            .api_key()
            .ok_or_else(|| RagError::ConfigError("no OpenAI API key configured".to_string()))?;

        let mut provider = crate::openai::OpenAIEmbeddingProvider::new(key)?
            .with_base_url(&settings.openai_base_url)
            .with_model(&settings.openai_embedding_model);
        if let Some(dims) = settings.openai_embedding_dimensions {
            provider = provider.with_dimensions(dims);
        }

        let probe = with_probe_timeout(
            "OpenAI",
            settings.probe_timeout,
            provider.embed_query("dimension probe"),
        )
        .await?;
        let provider = provider.with_observed_dimensions(probe.len());
        Ok(Arc::new(provider))
    }
}

/// A locally hosted Ollama embedding model.
#[cfg(feature = "ollama")]
#[derive(Debug, Default, Clone, Copy)]
pub struct OllamaStrategy;

#[cfg(feature = "ollama")]
#[async_trait]
impl EmbeddingStrategy for OllamaStrategy {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn initialize(&self, config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        let settings = &config.provider;
        let provider = with_probe_timeout(
            "Ollama",
            settings.probe_timeout,
            crate::ollama::OllamaEmbeddingProvider::connect(
                &settings.ollama_base_url,
                &settings.ollama_embedding_model,
            ),
        )
        .await?;
        Ok(Arc::new(provider))
    }
}

/// The dependency-free hash fallback. Only fails on a zero dimension.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashStrategy;

#[async_trait]
impl EmbeddingStrategy for HashStrategy {
    fn name(&self) -> &str {
        "hash"
    }

    async fn initialize(&self, config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(HashEmbeddingProvider::new(config.fallback_dimensions)?))
    }
}

/// An ordered list of embedding strategies, resolved once.
///
/// # Example
///
/// ```rust,ignore
/// use pdf_rag::EmbeddingChain;
///
/// let provider = EmbeddingChain::standard().resolve(&config).await?;
/// ```
pub struct EmbeddingChain {
    strategies: Vec<Box<dyn EmbeddingStrategy>>,
}

impl EmbeddingChain {
    /// An explicit strategy order.
    pub fn new(strategies: Vec<Box<dyn EmbeddingStrategy>>) -> Self {
        Self { strategies }
    }

    /// Hosted API, then local model service, then hash fallback.
    pub fn standard() -> Self {
        let mut strategies: Vec<Box<dyn EmbeddingStrategy>> = Vec::new();
        #[cfg(feature = "openai")]
        strategies.push(Box::new(OpenAIStrategy));
        #[cfg(feature = "ollama")]
        strategies.push(Box::new(OllamaStrategy));
        strategies.push(Box::new(HashStrategy));
        Self::new(strategies)
    }

    /// Strategy names in priority order.
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Return the first provider that initializes.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] listing every rejection if no
    /// strategy succeeds.
    pub async fn resolve(&self, config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        let mut rejections = Vec::new();

        for strategy in &self.strategies {
            match strategy.initialize(config).await {
                Ok(provider) => {
                    info!(
                        strategy = strategy.name(),
                        provider = provider.name(),
                        dimensions = provider.dimensions(),
                        "selected embedding provider"
                    );
                    if !rejections.is_empty() {
                        warn!(
                            strategy = strategy.name(),
                            "using a fallback embedding backend; re-ingest if the preferred backend returns"
                        );
                    }
                    return Ok(provider);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "embedding strategy unavailable");
                    rejections.push(format!("{}: {e}", strategy.name()));
                }
            }
        }

        Err(RagError::ConfigError(format!(
            "no embedding backend available ({})",
            rejections.join("; ")
        )))
    }
}

impl Default for EmbeddingChain {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable;

    #[async_trait]
    impl EmbeddingStrategy for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        async fn initialize(&self, _config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
            Err(RagError::EmbeddingError { provider: "x".into(), message: "down".into() })
        }
    }

    #[tokio::test]
    async fn first_working_strategy_wins() {
        let chain = EmbeddingChain::new(vec![Box::new(Unavailable), Box::new(HashStrategy)]);
        let config = RagConfig::builder().fallback_dimensions(32).build().unwrap();
        let provider = chain.resolve(&config).await.unwrap();
        assert_eq!(provider.name(), "hash");
        assert_eq!(provider.dimensions(), 32);
    }

    #[tokio::test]
    async fn exhausted_chain_is_a_config_error() {
        let chain = EmbeddingChain::new(vec![Box::new(Unavailable)]);
        let err = chain.resolve(&RagConfig::default()).await.err().unwrap();
        assert!(matches!(err, RagError::ConfigError(ref m) if m.contains("unavailable: ")));
    }

    #[test]
    fn standard_order_ends_with_hash() {
        let chain = EmbeddingChain::standard();
        assert_eq!(chain.names().last(), Some(&"hash"));
        #[cfg(all(feature = "openai", feature = "ollama"))]
        assert_eq!(chain.names(), vec!["openai", "ollama", "hash"]);
    }
}
