//! Tool trait and Toolkit — the abstraction over agent capabilities.
//!
//! Tools give an agent the ability to act: run commands, read files,
//! retrieve knowledge, or delegate to another agent. A [`Toolkit`] holds
//! the registered tools, organizes them into groups that can be switched
//! on and off, and turns the model's tool-use blocks into tool-result
//! blocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::message::ContentBlock;
use crate::model::ToolSchema;

/// What a tool returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: true,
            metadata: serde_json::Map::new(),
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name sent to the model.
    fn name(&self) -> &str;

    /// What the tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema of the tool input.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the tool.
    async fn call(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError>;

    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A named set of tools that can be activated together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolGroup {
    pub name: String,
    pub description: String,
    pub active: bool,
}

/// Registry of tools available to an agent.
#[derive(Default)]
pub struct Toolkit {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
    membership: HashMap<String, String>,
    groups: HashMap<String, ToolGroup>,
}

impl Toolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ungrouped tool. Replaces any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.membership.remove(&name);
        self.tools.insert(name, tool);
    }

    /// Register a tool into an existing group.
    pub fn register_in_group(&mut self, tool: Arc<dyn Tool>, group: &str) -> Result<(), ToolError> {
        if !self.groups.contains_key(group) {
            return Err(ToolError::InvalidArguments(format!(
                "tool group '{group}' does not exist"
            )));
        }
        let name = tool.name().to_string();
        self.register(tool);
        self.membership.insert(name, group.to_string());
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.membership.remove(name);
        self.tools.remove(name).is_some()
    }

    pub fn create_group(&mut self, name: &str, description: &str, active: bool) {
        self.groups.insert(
            name.to_string(),
            ToolGroup {
                name: name.to_string(),
                description: description.to_string(),
                active,
            },
        );
    }

    pub fn set_group_active(&mut self, name: &str, active: bool) -> Result<(), ToolError> {
        let group = self
            .groups
            .get_mut(name)
            .ok_or_else(|| ToolError::InvalidArguments(format!("tool group '{name}' does not exist")))?;
        group.active = active;
        Ok(())
    }

    pub fn groups(&self) -> Vec<&ToolGroup> {
        let mut groups: Vec<_> = self.groups.values().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    fn is_active(&self, name: &str) -> bool {
        match self.membership.get(name) {
            Some(group) => self.groups.get(group).is_some_and(|g| g.active),
            None => true,
        }
    }

    /// Schemas of ungrouped tools and tools in active groups, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter(|n| self.is_active(n))
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.to_schema())
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute one tool-use block, producing its tool-result block.
    ///
    /// Failures never propagate: they become error results the model can read.
    pub async fn call(&self, tool_use: &ContentBlock) -> ContentBlock {
        let ContentBlock::ToolUse { id, name, input } = tool_use else {
            return ContentBlock::tool_result(
                "",
                "",
                vec![ContentBlock::text("Error: not a tool_use block")],
                true,
            );
        };

        let output = match self.execute(name, input.clone()).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool call failed");
                ToolOutput::error(format!("Error: {e}"))
            }
        };
        ContentBlock::tool_result(id.clone(), name.clone(), output.content, output.is_error)
    }

    /// Execute several tool-use blocks, preserving their order in the output.
    pub async fn call_many(&self, tool_uses: &[ContentBlock], parallel: bool) -> Vec<ContentBlock> {
        if parallel {
            futures::future::join_all(tool_uses.iter().map(|b| self.call(b))).await
        } else {
            let mut results = Vec::with_capacity(tool_uses.len());
            for block in tool_uses {
                results.push(self.call(block).await);
            }
            results
        }
    }

    async fn execute(&self, name: &str, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .filter(|_| self.is_active(name))
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        validate_input(&tool.parameters_schema(), &input)?;
        debug!(tool = %name, "Executing tool");
        tool.call(input).await
    }
}

/// Check that `input` is an object containing every `required` key of `schema`.
pub fn validate_input(schema: &serde_json::Value, input: &serde_json::Value) -> Result<(), ToolError> {
    let Some(obj) = input.as_object() else {
        return Err(ToolError::InvalidArguments(
            "tool input must be a JSON object".into(),
        ));
    };
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        let missing: Vec<&str> = required
            .iter()
            .filter_map(|k| k.as_str())
            .filter(|k| !obj.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "missing required argument(s): {}",
                missing.join(", ")
            )));
        }
    }
    Ok(())
}
