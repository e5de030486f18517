//! Knowledge trait — retrieval-augmented generation (RAG).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A chunk of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    /// Origin of the chunk (file name, url, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Relevance score set by retrieval
    #[serde(default)]
    pub score: f32,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            source: None,
            metadata: serde_json::Map::new(),
            score: 0.0,
            embedding: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Retrieval parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub score_threshold: f32,
}

fn default_limit() -> usize {
    5
}

impl Default for RetrieveConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            score_threshold: 0.0,
        }
    }
}

/// How an agent uses its knowledge base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagMode {
    /// Retrieve with the user query before reasoning and inject the results
    #[default]
    Generic,
    /// Expose retrieval as a tool the agent calls when it wants
    Agentic,
}

/// A searchable knowledge base.
#[async_trait]
pub trait Knowledge: Send + Sync {
    /// Index documents. Returns how many chunks were stored.
    async fn add_documents(&self, docs: Vec<Document>) -> Result<usize, MemoryError>;

    /// Most relevant documents first, at most `config.limit`, each scoring
    /// at least `config.score_threshold`.
    async fn retrieve(&self, query: &str, config: &RetrieveConfig) -> Result<Vec<Document>, MemoryError>;
}

/// Render retrieved documents as a prompt section.
pub fn format_documents(docs: &[Document]) -> String {
    let mut out = String::from("<knowledge>\n");
    for (i, doc) in docs.iter().enumerate() {
        let source = doc.source.as_deref().unwrap_or("unknown");
        out.push_str(&format!(
            "[{}] (source: {}, score: {:.2})\n{}\n",
            i + 1,
            source,
            doc.score,
            doc.content
        ));
    }
    out.push_str("</knowledge>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_config_defaults() {
        let cfg = RetrieveConfig::default();
        assert_eq!(cfg.limit, 5);
        assert_eq!(cfg.score_threshold, 0.0);
    }

    #[test]
    fn documents_are_numbered_with_sources() {
        let mut doc = Document::new("Boba is chewy").with_source("menu.txt");
        doc.score = 0.87;
        let text = format_documents(&[doc]);
        assert!(text.starts_with("<knowledge>"));
        assert!(text.contains("[1] (source: menu.txt, score: 0.87)"));
        assert!(text.contains("Boba is chewy"));
    }
}
