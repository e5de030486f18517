//! Message and content-block domain types.
//!
//! A [`Msg`] is the unit that flows between agents, memories, models and
//! the A2A bridge. Its content is an ordered list of [`ContentBlock`]s so a
//! single message can carry text, reasoning, media, tool calls and tool
//! results together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgRole {
    /// The end user (or another agent speaking as a user)
    User,
    /// An assistant / agent reply
    Assistant,
    /// System instructions
    System,
    /// Tool execution results
    Tool,
}

impl std::fmt::Display for MsgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Where a media block's bytes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    Url { url: String },
    Base64 { media_type: String, data: String },
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    Image {
        source: Source,
    },
    Audio {
        source: Source,
    },
    Video {
        source: Source,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        id: String,
        name: String,
        output: Vec<ContentBlock>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
        }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        output: Vec<ContentBlock>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            id: id.into(),
            name: name.into(),
            output,
            is_error,
        }
    }

    /// The serde tag of this block (`"text"`, `"tool_use"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Thinking { .. } => "thinking",
            Self::Image { .. } => "image",
            Self::Audio { .. } => "audio",
            Self::Video { .. } => "video",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
        }
    }

    /// Text of a text block, `None` for everything else.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Flatten the text parts of a list of blocks (used for tool outputs).
pub fn blocks_to_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| b.as_text())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A message exchanged between agents, users, models and tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    /// Unique message ID
    pub id: String,

    /// Display name of the sender (agent name, "user", ...)
    pub name: String,

    /// Who sent this message
    pub role: MsgRole,

    /// Ordered content blocks
    pub content: Vec<ContentBlock>,

    /// Free-form metadata (structured output, A2A ids, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Msg {
    pub fn new(name: impl Into<String>, role: MsgRole, content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            role,
            content,
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// A user message holding a single text block.
    pub fn user(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, MsgRole::User, vec![ContentBlock::text(text)])
    }

    /// An assistant message holding a single text block.
    pub fn assistant(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, MsgRole::Assistant, vec![ContentBlock::text(text)])
    }

    /// A system message holding a single text block.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new("system", MsgRole::System, vec![ContentBlock::text(text)])
    }

    pub fn builder() -> MsgBuilder {
        MsgBuilder::default()
    }

    /// All text blocks joined by newlines.
    pub fn text_content(&self) -> String {
        blocks_to_text(&self.content)
    }

    /// The tool-use blocks requested in this message.
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        self.content
            .iter()
            .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
            .collect()
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// Blocks whose serde tag equals `kind`.
    pub fn content_blocks_of(&self, kind: &str) -> Vec<&ContentBlock> {
        self.content.iter().filter(|b| b.kind() == kind).collect()
    }

    /// Set a metadata entry, returning self.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Builder for messages with several blocks.
#[derive(Debug, Default)]
pub struct MsgBuilder {
    id: Option<String>,
    name: Option<String>,
    role: Option<MsgRole>,
    content: Vec<ContentBlock>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl MsgBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn role(mut self, role: MsgRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.content.push(ContentBlock::text(text));
        self
    }

    pub fn block(mut self, block: ContentBlock) -> Self {
        self.content.push(block);
        self
    }

    pub fn blocks(mut self, blocks: impl IntoIterator<Item = ContentBlock>) -> Self {
        self.content.extend(blocks);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Defaults: name `"user"`, role [`MsgRole::User`], fresh id.
    pub fn build(self) -> Msg {
        let mut msg = Msg::new(
            self.name.unwrap_or_else(|| "user".into()),
            self.role.unwrap_or(MsgRole::User),
            self.content,
        );
        if let Some(id) = self.id {
            msg.id = id;
        }
        msg.metadata = self.metadata;
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Msg::user("alice", "Hello, agent!");
        assert_eq!(msg.role, MsgRole::User);
        assert_eq!(msg.name, "alice");
        assert_eq!(msg.text_content(), "Hello, agent!");
        assert!(!msg.has_tool_use());
    }

    #[test]
    fn text_content_skips_non_text_blocks() {
        let msg = Msg::builder()
            .role(MsgRole::Assistant)
            .text("first")
            .block(ContentBlock::thinking("hidden"))
            .block(ContentBlock::tool_use("c1", "search", serde_json::json!({"q": "x"})))
            .text("second")
            .build();
        assert_eq!(msg.text_content(), "first\nsecond");
        assert_eq!(msg.tool_uses().len(), 1);
        assert_eq!(msg.content_blocks_of("thinking").len(), 1);
    }

    #[test]
    fn builder_defaults_and_overrides() {
        let msg = Msg::builder().id("fixed").text("hi").build();
        assert_eq!(msg.id, "fixed");
        assert_eq!(msg.name, "user");
        assert_eq!(msg.role, MsgRole::User);
    }

    #[test]
    fn block_serialization_is_tagged() {
        let block = ContentBlock::tool_result("c1", "calc", vec![ContentBlock::text("4")], false);
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["output"][0]["type"], "text");
        assert!(json.get("is_error").is_none());

        let img = ContentBlock::Image {
            source: Source::Url {
                url: "https://x/y.png".into(),
            },
        };
        let json = serde_json::to_value(&img).unwrap();
        assert_eq!(json["source"]["type"], "url");
    }

    #[test]
    fn message_deserializes_without_metadata() {
        let json = r#"{"id":"1","name":"bot","role":"assistant",
            "content":[{"type":"text","text":"ok"}],
            "timestamp":"2025-01-01T00:00:00Z"}"#;
        let msg: Msg = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, MsgRole::Assistant);
        assert!(msg.metadata.is_empty());
    }
}
