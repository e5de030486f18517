//! Long-term memory tools — let the agent decide what to remember and
//! when to recall it.
//!
//! - `record_to_memory`: store facts worth keeping across sessions
//! - `retrieve_from_memory`: recall facts by keyword

use std::sync::Arc;

use agentscope_core::error::ToolError;
use agentscope_core::memory::LongTermMemory;
use agentscope_core::tool::{Tool, ToolOutput};
use agentscope_core::Msg;
use async_trait::async_trait;
use tracing::debug;

pub const RECORD_TOOL: &str = "record_to_memory";
pub const RETRIEVE_TOOL: &str = "retrieve_from_memory";

fn string_list(input: &serde_json::Value, key: &str) -> Result<Vec<String>, ToolError> {
    match &input[key] {
        serde_json::Value::String(s) => Ok(vec![s.clone()]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must hold strings")))
            })
            .collect(),
        _ => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a string or a list of strings"
        ))),
    }
}

fn memory_failure(tool: &str, e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.into(),
        reason: e.to_string(),
    }
}

pub struct RecordToMemoryTool {
    memory: Arc<dyn LongTermMemory>,
    agent_name: String,
}

impl RecordToMemoryTool {
    pub fn new(memory: Arc<dyn LongTermMemory>, agent_name: impl Into<String>) -> Self {
        Self {
            memory,
            agent_name: agent_name.into(),
        }
    }
}

#[async_trait]
impl Tool for RecordToMemoryTool {
    fn name(&self) -> &str {
        RECORD_TOOL
    }

    fn description(&self) -> &str {
        "Record important facts to long-term memory so they can be recalled in later conversations."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "thinking": {
                    "type": "string",
                    "description": "Why these facts are worth remembering"
                },
                "content": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "The facts to remember, one per item"
                }
            },
            "required": ["content"]
        })
    }

    async fn call(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let facts = string_list(&input, "content")?;
        let msgs: Vec<Msg> = facts
            .iter()
            .filter(|f| !f.trim().is_empty())
            .map(|f| Msg::assistant(self.agent_name.as_str(), f.as_str()))
            .collect();
        if msgs.is_empty() {
            return Ok(ToolOutput::error("Nothing to record."));
        }
        self.memory
            .record(&msgs)
            .await
            .map_err(|e| memory_failure(RECORD_TOOL, e))?;
        debug!(count = msgs.len(), "Recorded facts to long-term memory");
        Ok(ToolOutput::text(format!("Recorded {} item(s) to memory.", msgs.len())))
    }
}

pub struct RetrieveFromMemoryTool {
    memory: Arc<dyn LongTermMemory>,
    limit: usize,
}

impl RetrieveFromMemoryTool {
    pub fn new(memory: Arc<dyn LongTermMemory>, limit: usize) -> Self {
        Self {
            memory,
            limit: limit.max(1),
        }
    }
}

#[async_trait]
impl Tool for RetrieveFromMemoryTool {
    fn name(&self) -> &str {
        RETRIEVE_TOOL
    }

    fn description(&self) -> &str {
        "Search long-term memory for facts recorded in earlier conversations."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "keywords": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Keywords to search for"
                }
            },
            "required": ["keywords"]
        })
    }

    async fn call(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let keywords = string_list(&input, "keywords")?;
        let mut lines: Vec<String> = Vec::new();
        for keyword in keywords.iter().filter(|k| !k.trim().is_empty()) {
            let items = self
                .memory
                .retrieve(keyword, self.limit)
                .await
                .map_err(|e| memory_failure(RETRIEVE_TOOL, e))?;
            for item in items {
                if !lines.contains(&item.content) {
                    lines.push(item.content);
                }
            }
        }

        if lines.is_empty() {
            return Ok(ToolOutput::text("No matching memories."));
        }
        Ok(ToolOutput::text(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscope_core::message::blocks_to_text;
    use agentscope_memory::InMemoryLongTermMemory;

    #[tokio::test]
    async fn record_then_retrieve() {
        let ltm: Arc<dyn LongTermMemory> = Arc::new(InMemoryLongTermMemory::new());
        let record = RecordToMemoryTool::new(ltm.clone(), "Friday");
        let retrieve = RetrieveFromMemoryTool::new(ltm, 5);

        let out = record
            .call(serde_json::json!({
                "thinking": "user preferences",
                "content": ["User prefers dark roast coffee", "User lives in Hangzhou"]
            }))
            .await
            .unwrap();
        assert!(!out.is_error);

        let out = retrieve
            .call(serde_json::json!({"keywords": ["coffee", "roast"]}))
            .await
            .unwrap();
        let text = blocks_to_text(&out.content);
        assert_eq!(text, "Friday: User prefers dark roast coffee");
    }

    #[tokio::test]
    async fn empty_recall() {
        let ltm: Arc<dyn LongTermMemory> = Arc::new(InMemoryLongTermMemory::new());
        let out = RetrieveFromMemoryTool::new(ltm, 5)
            .call(serde_json::json!({"keywords": "anything"}))
            .await
            .unwrap();
        assert_eq!(blocks_to_text(&out.content), "No matching memories.");
    }

    #[tokio::test]
    async fn bad_content_rejected() {
        let ltm: Arc<dyn LongTermMemory> = Arc::new(InMemoryLongTermMemory::new());
        let err = RecordToMemoryTool::new(ltm, "Friday")
            .call(serde_json::json!({"content": 42}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
