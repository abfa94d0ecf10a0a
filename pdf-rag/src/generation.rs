//! Text generation: the [`Generator`] capability, the answer prompt, and the
//! [`GenerationEngine`] that turns retrieved context into an answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::{ModelProvider, ProviderConfig};
use crate::document::SearchResult;
use crate::error::{RagError, Result};

/// Reply the model is told to give when the context does not contain the answer.
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information to answer this question.";

/// Instruction template for answering from retrieved context.
///
/// `{context}` and `{question}` are substituted by [`render_prompt`].
pub const RAG_PROMPT_TEMPLATE: &str = "\
You are a helpful AI assistant that provides information based on the documents you have access to.
Use the following context to answer the question. If you don't know the answer or if the answer
cannot be determined from the context, say \"I don't have enough information to answer this question.\"
Don't try to make up an answer.

Context:
{context}

Question: {question}

Answer:
";

/// A text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model or backend label used in logs and errors.
    fn name(&self) -> &str;

    /// Produce a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Concatenate retrieved chunk texts (in retrieval order) into the context
/// block and fill the answer template.
pub fn render_prompt(results: &[SearchResult], question: &str) -> String {
    let context = results.iter().map(|r| r.chunk.text.trim()).collect::<Vec<_>>().join("\n\n");
    RAG_PROMPT_TEMPLATE.replace("{context}", &context).replace("{question}", question)
}

/// Renders the answer prompt and invokes the generator.
#[derive(Clone)]
pub struct GenerationEngine {
    generator: Arc<dyn Generator>,
}

impl GenerationEngine {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Answer `question` from `context`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the backend call fails.
    pub async fn answer(&self, question: &str, context: &[SearchResult]) -> Result<String> {
        let prompt = render_prompt(context, question);
        debug!(
            generator = self.generator.name(),
            context_chunks = context.len(),
            prompt_len = prompt.len(),
            "generating answer"
        );
        let answer = self.generator.generate(&prompt).await.map_err(|e| {
            error!(generator = self.generator.name(), error = %e, "generation failed");
            match e {
                RagError::GenerationError { .. } => e,
                other => RagError::GenerationError {
                    provider: self.generator.name().to_string(),
                    message: other.to_string(),
                },
            }
        })?;
        Ok(answer.trim().to_string())
    }
}

/// Build the completion backend named by `config.provider`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if the OpenAI provider is selected
/// without an API key, or the selected provider's feature is disabled.
pub fn generator_from_config(config: &ProviderConfig) -> Result<Arc<dyn Generator>> {
    match config.provider {
        ModelProvider::OpenAI => {
            #[cfg(feature = "openai")]
            {
                let key = config.api_key().ok_or_else(|| {
                    RagError::ConfigError(
                        "OPENAI_API_KEY is required when the provider is 'openai'".to_string(),
                    )
                })?;
                let generator = crate::openai::OpenAIChatGenerator::new(key)?
                    .with_base_url(&config.openai_base_url)
                    .with_model(&config.openai_completion_model)
                    .with_temperature(config.temperature)
                    .with_max_tokens(config.max_tokens);
                Ok(Arc::new(generator))
            }
            #[cfg(not(feature = "openai"))]
            {
                Err(RagError::ConfigError("the 'openai' feature is not enabled".to_string()))
            }
        }
        ModelProvider::Ollama => {
            #[cfg(feature = "ollama")]
            {
                let generator = crate::ollama::OllamaGenerator::new(
                    &config.ollama_base_url,
                    &config.ollama_completion_model,
                )
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens);
                Ok(Arc::new(generator))
            }
            #[cfg(not(feature = "ollama"))]
            {
                Err(RagError::ConfigError("the 'ollama' feature is not enabled".to_string()))
            }
        }
    }
}
