//! Agent-as-tool — lets a supervisor agent delegate work to another agent.

use std::sync::Arc;

use agentscope_core::error::ToolError;
use agentscope_core::tool::{Tool, ToolOutput};
use agentscope_core::{Agent, Msg};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Deserialize)]
struct TaskInput {
    task: String,
}

/// Wraps an [`Agent`] as a [`Tool`] taking a `task` string.
///
/// Each call sends the task as a user message and returns the agent's
/// reply text. The wrapped agent keeps its own memory between calls.
pub struct AgentTool {
    agent: Arc<dyn Agent>,
    tool_name: String,
    description: String,
}

impl AgentTool {
    pub fn new(agent: Arc<dyn Agent>, description: impl Into<String>) -> Self {
        let tool_name = format!("call_{}", agent.name().to_lowercase().replace(' ', "_"));
        Self {
            agent,
            tool_name,
            description: description.into(),
        }
    }

    /// Override the generated `call_<agent>` name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task to hand over, with all context the agent needs"
                }
            },
            "required": ["task"]
        })
    }

    async fn call(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let TaskInput { task } =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        info!(agent = %self.agent.name(), "Delegating task");
        debug!(task = %task, "Delegated task");

        let reply = self
            .agent
            .call(vec![Msg::user("user", task)])
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.tool_name.clone(),
                reason: e.to_string(),
            })?;

        let mut output = ToolOutput::text(reply.text_content());
        output
            .metadata
            .insert("agent".into(), serde_json::Value::String(reply.name));
        Ok(output)
    }
}
