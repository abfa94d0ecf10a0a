//! Query expansion for multi-query retrieval.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::generation::Generator;

/// Instruction template for generating alternative phrasings.
///
/// `{count}` and `{question}` are substituted by [`QueryExpander::expand`].
pub const MULTI_QUERY_PROMPT_TEMPLATE: &str = "\
You are an AI assistant helping to generate multiple search queries for retrieving relevant documents.
Your task is to generate {count} different versions of the given user question to retrieve relevant information
from a vector database. By generating multiple perspectives on the user question, your goal is to help
find the most useful documents that might answer the original question.

Provide these alternative questions separated by newlines. Don't include any numbering or prefixes.
Each line should contain just one complete question.

Original question: {question}
";

static ENUMERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+[.):-]\s*").expect("unreachable error: failed to compile enumeration regex")
});

/// Parse model output into candidate questions.
///
/// One candidate per non-blank line, trimmed, with a leading enumeration
/// token such as `1.`, `2)`, `3:` or `4-` removed. Duplicates are kept.
pub fn parse_expansion(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| ENUMERATION.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Generates alternative phrasings of a question.
#[derive(Clone)]
pub struct QueryExpander {
    generator: Arc<dyn Generator>,
    count: usize,
}

impl QueryExpander {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator, count: 3 }
    }

    /// Number of alternatives to ask for. The model may return a different
    /// number; all parsed lines are used.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }

    /// Ask the generator for alternative questions.
    ///
    /// # Errors
    ///
    /// Returns the generator's error, or [`RagError::QueryError`] when the
    /// output contains no usable line.
    pub async fn expand(&self, question: &str) -> Result<Vec<String>> {
        let prompt = MULTI_QUERY_PROMPT_TEMPLATE
            .replace("{count}", &self.count.to_string())
            .replace("{question}", question);
        let output = self.generator.generate(&prompt).await?;
        let alternatives = parse_expansion(&output);
        if alternatives.is_empty() {
            return Err(RagError::QueryError("query expansion produced no alternatives".to_string()));
        }
        debug!(question, alternatives = ?alternatives, "expanded query");
        Ok(alternatives)
    }
}
