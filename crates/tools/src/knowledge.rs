//! `retrieve_knowledge` — agentic RAG: the agent queries its knowledge base
//! when it decides it needs to.

use std::sync::Arc;

use agentscope_core::error::ToolError;
use agentscope_core::knowledge::{format_documents, Knowledge, RetrieveConfig};
use agentscope_core::tool::{Tool, ToolOutput};
use async_trait::async_trait;

pub const RETRIEVE_KNOWLEDGE_TOOL: &str = "retrieve_knowledge";

pub struct RetrieveKnowledgeTool {
    knowledge: Arc<dyn Knowledge>,
    defaults: RetrieveConfig,
}

impl RetrieveKnowledgeTool {
    pub fn new(knowledge: Arc<dyn Knowledge>, defaults: RetrieveConfig) -> Self {
        Self { knowledge, defaults }
    }
}

#[async_trait]
impl Tool for RetrieveKnowledgeTool {
    fn name(&self) -> &str {
        RETRIEVE_KNOWLEDGE_TOOL
    }

    fn description(&self) -> &str {
        "Search the knowledge base for documents relevant to a query. Returns chunks sorted by relevance."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for"
                },
                "limit": {
                    "type": "integer",
                    "description": format!("Maximum number of chunks (default {})", self.defaults.limit)
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = input["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'query' must be a string".into()))?;
        let config = RetrieveConfig {
            limit: input["limit"]
                .as_u64()
                .map(|l| l.clamp(1, 50) as usize)
                .unwrap_or(self.defaults.limit),
            score_threshold: self.defaults.score_threshold,
        };

        let docs = self
            .knowledge
            .retrieve(query, &config)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: RETRIEVE_KNOWLEDGE_TOOL.into(),
                reason: e.to_string(),
            })?;

        if docs.is_empty() {
            return Ok(ToolOutput::text(format!("No relevant documents found for '{query}'.")));
        }
        let mut out = ToolOutput::text(format_documents(&docs));
        out.metadata.insert("count".into(), docs.len().into());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscope_core::knowledge::Document;
    use agentscope_core::message::blocks_to_text;
    use agentscope_memory::KeywordKnowledge;

    async fn kb() -> Arc<dyn Knowledge> {
        let kb = KeywordKnowledge::new();
        kb.add_documents(vec![
            Document::new("Tokio is an async runtime for Rust").with_source("tokio.md"),
            Document::new("Axum is a web framework built on tokio").with_source("axum.md"),
        ])
        .await
        .unwrap();
        Arc::new(kb)
    }

    #[tokio::test]
    async fn formats_hits() {
        let tool = RetrieveKnowledgeTool::new(kb().await, RetrieveConfig::default());
        let out = tool
            .call(serde_json::json!({"query": "async runtime", "limit": 1}))
            .await
            .unwrap();
        let text = blocks_to_text(&out.content);
        assert!(text.starts_with("<knowledge>"));
        assert!(text.contains("source: tokio.md"));
        assert!(!text.contains("axum.md"));
        assert_eq!(out.metadata["count"], 1);
    }

    #[tokio::test]
    async fn no_hits_is_not_an_error() {
        let tool = RetrieveKnowledgeTool::new(kb().await, RetrieveConfig::default());
        let out = tool
            .call(serde_json::json!({"query": "gardening"}))
            .await
            .unwrap();
        assert!(!out.is_error);
        assert!(blocks_to_text(&out.content).contains("No relevant documents"));
    }
}
