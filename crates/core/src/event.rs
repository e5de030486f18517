//! Agent events — what an agent emits while it works.
//!
//! A streaming agent call yields a sequence of [`AgentEvent`]s: text and
//! thinking deltas as the model produces them, tool invocations and their
//! results, and finally a `Done` carrying the reply.

use serde::{Deserialize, Serialize};

use crate::message::{ContentBlock, Msg};
use crate::model::Usage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A text delta from the model.
    ReasoningChunk { text: String },

    /// A thinking delta from a reasoning model.
    Thinking { text: String },

    /// The agent is about to run a tool.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// A tool finished.
    ToolResult {
        id: String,
        name: String,
        output: Vec<ContentBlock>,
        is_error: bool,
    },

    /// An intermediate reply (e.g. from a hub participant).
    Reply { msg: Msg },

    /// The call completed.
    Done {
        msg: Msg,
        iterations: usize,
        #[serde(default)]
        usage: Usage,
    },

    /// The call failed.
    Error { message: String },
}

impl AgentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ReasoningChunk { .. } => "reasoning_chunk",
            Self::Thinking { .. } => "thinking",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Reply { .. } => "reply",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// `Done` and `Error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Build the result event for a tool-result block.
    pub fn from_tool_result(block: &ContentBlock) -> Option<Self> {
        match block {
            ContentBlock::ToolResult {
                id,
                name,
                output,
                is_error,
            } => Some(Self::ToolResult {
                id: id.clone(),
                name: name.clone(),
                output: output.clone(),
                is_error: *is_error,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = AgentEvent::ReasoningChunk { text: "Hel".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reasoning_chunk");
        assert_eq!(json["text"], "Hel");
        assert_eq!(event.event_type(), "reasoning_chunk");
        assert!(!event.is_terminal());
    }

    #[test]
    fn done_is_terminal() {
        let event = AgentEvent::Done {
            msg: Msg::assistant("bot", "hi"),
            iterations: 1,
            usage: Usage::default(),
        };
        assert!(event.is_terminal());
        assert!(AgentEvent::Error { message: "x".into() }.is_terminal());
    }

    #[test]
    fn tool_result_event_from_block() {
        let block = ContentBlock::tool_result("c1", "shell", vec![ContentBlock::text("ok")], false);
        match AgentEvent::from_tool_result(&block) {
            Some(AgentEvent::ToolResult { id, name, is_error, .. }) => {
                assert_eq!(id, "c1");
                assert_eq!(name, "shell");
                assert!(!is_error);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(AgentEvent::from_tool_result(&ContentBlock::text("x")).is_none());
    }
}
