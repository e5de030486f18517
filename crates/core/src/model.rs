//! ChatModel trait — the abstraction over LLM backends.
//!
//! A chat model knows how to send a list of [`Msg`]s to an LLM and get a
//! reply back, either as a complete response or as a stream of chunks.
//!
//! Implementations: DashScope, OpenAI-compatible, Ollama.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ModelError;
use crate::message::{ContentBlock, Msg, MsgRole};

/// A tool schema sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// How the model may choose tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
    Specific(String),
}

/// Sampling and generation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    #[serde(default)]
    pub tool_choice: ToolChoice,

    /// Ask reasoning-capable models to emit their thinking
    #[serde(default)]
    pub enable_thinking: bool,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
            top_p: None,
            stop: Vec::new(),
            tool_choice: ToolChoice::Auto,
            enable_thinking: false,
        }
    }
}

/// A request to a chat model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Msg>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
    #[serde(default)]
    pub options: GenerateOptions,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Msg>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            options: GenerateOptions::default(),
            stream: false,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    /// Wall-clock time of the call
    #[serde(default)]
    pub time_ms: u64,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            time_ms: 0,
        }
    }

    /// Field-wise sum, used to aggregate a whole agent call.
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.time_ms += other.time_ms;
    }
}

/// A complete (non-streaming) model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub usage: Option<Usage>,
    pub model: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Turn the response into an assistant message from `name`.
    pub fn into_msg(self, name: &str) -> Msg {
        let mut msg = Msg::new(name, MsgRole::Assistant, self.content);
        if let Some(usage) = self.usage
            && let Ok(v) = serde_json::to_value(usage)
        {
            msg.metadata.insert("usage".into(), v);
        }
        msg
    }
}

/// A single chunk of a streaming response.
///
/// `content` carries deltas: text and thinking fragments, plus tool-use
/// blocks. A tool-use block whose `input` is a JSON string is an argument
/// fragment to be joined; an object input is the complete arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(delta)],
            done: false,
            usage: None,
        }
    }
}

/// Receiver half of a model stream.
pub type ChunkStream = tokio::sync::mpsc::Receiver<Result<ChatChunk, ModelError>>;

/// The core chat-model trait.
///
/// Agents call `chat()` or `stream()` without knowing which vendor sits
/// behind it.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name (e.g. "dashscope", "openai", "ollama").
    fn name(&self) -> &str;

    /// The default model this client sends requests to.
    fn model_name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError>;

    /// Send a request and get a stream of chunks.
    ///
    /// Default implementation calls `chat()` and wraps the result as one chunk.
    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, ModelError> {
        let response = self.chat(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(ChatChunk {
                content: response.content,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// List available models for this provider.
    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        Ok(Vec::new())
    }
}

/// Embedding models turn texts into vectors for retrieval.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// Vector size, when known up front.
    fn dimensions(&self) -> Option<usize> {
        None
    }
}

/// Folds streaming chunks into a final [`ChatResponse`].
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    text: String,
    thinking: String,
    tool_order: Vec<String>,
    tools: HashMap<String, PendingToolUse>,
    usage: Option<Usage>,
}

#[derive(Debug, Default)]
struct PendingToolUse {
    name: String,
    fragments: String,
    complete: Option<serde_json::Value>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &ChatChunk) {
        for block in &chunk.content {
            match block {
                ContentBlock::Text { text } => self.text.push_str(text),
                ContentBlock::Thinking { thinking } => self.thinking.push_str(thinking),
                ContentBlock::ToolUse { id, name, input } => {
                    if !self.tools.contains_key(id) {
                        self.tool_order.push(id.clone());
                    }
                    let pending = self.tools.entry(id.clone()).or_default();
                    if !name.is_empty() {
                        pending.name = name.clone();
                    }
                    match input {
                        serde_json::Value::String(fragment) => pending.fragments.push_str(fragment),
                        serde_json::Value::Null => {}
                        other => pending.complete = Some(other.clone()),
                    }
                }
                _ => {}
            }
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish(self, model: impl Into<String>) -> ChatResponse {
        let mut content = Vec::new();
        if !self.thinking.is_empty() {
            content.push(ContentBlock::thinking(self.thinking));
        }
        if !self.text.is_empty() {
            content.push(ContentBlock::text(self.text));
        }
        let mut tools = self.tools;
        for id in self.tool_order {
            let Some(pending) = tools.remove(&id) else {
                continue;
            };
            let input = match pending.complete {
                Some(v) => v,
                None => parse_arguments(&pending.fragments),
            };
            content.push(ContentBlock::tool_use(id, pending.name, input));
        }
        ChatResponse {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            usage: self.usage,
            model: model.into(),
            finish_reason: None,
        }
    }
}

/// Parse tool-call arguments emitted by a model.
///
/// Empty text means no arguments; unparsable text is preserved under `_raw`.
pub fn parse_arguments(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::json!({ "_raw": raw }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_options_defaults() {
        let opts = GenerateOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.tool_choice, ToolChoice::Auto);
        assert!(!opts.enable_thinking);
    }

    #[test]
    fn accumulator_joins_text_and_argument_fragments() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&ChatChunk::text("Hel"));
        acc.push(&ChatChunk::text("lo"));
        acc.push(&ChatChunk {
            content: vec![ContentBlock::tool_use("c1", "calc", serde_json::json!("{\"expr\""))],
            ..Default::default()
        });
        acc.push(&ChatChunk {
            content: vec![ContentBlock::tool_use("c1", "", serde_json::json!(": \"2+2\"}"))],
            done: true,
            usage: Some(Usage::new(3, 4)),
        });
        assert_eq!(acc.text(), "Hello");

        let resp = acc.finish("m");
        assert_eq!(resp.content.len(), 2);
        assert_eq!(resp.content[0], ContentBlock::text("Hello"));
        match &resp.content[1] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "c1");
                assert_eq!(name, "calc");
                assert_eq!(input["expr"], "2+2");
            }
            other => panic!("unexpected block {other:?}"),
        }
        assert_eq!(resp.usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn accumulator_keeps_thinking_first() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&ChatChunk::text("answer"));
        acc.push(&ChatChunk {
            content: vec![ContentBlock::thinking("hmm")],
            ..Default::default()
        });
        let resp = acc.finish("m");
        assert_eq!(resp.content[0].kind(), "thinking");
    }

    #[test]
    fn unparsable_arguments_are_preserved() {
        assert_eq!(parse_arguments(""), serde_json::json!({}));
        assert_eq!(parse_arguments("{\"a\":1}")["a"], 1);
        assert_eq!(parse_arguments("{broken")["_raw"], "{broken");
    }

    #[test]
    fn usage_aggregates() {
        let mut total = Usage::default();
        total.add(&Usage::new(10, 5));
        total.add(&Usage::new(1, 2));
        assert_eq!(total.total_tokens, 18);
    }

    #[test]
    fn response_into_msg_records_usage() {
        let resp = ChatResponse {
            id: "r".into(),
            content: vec![ContentBlock::text("hi")],
            usage: Some(Usage::new(1, 1)),
            model: "m".into(),
            finish_reason: Some("stop".into()),
        };
        let msg = resp.into_msg("bot");
        assert_eq!(msg.role, MsgRole::Assistant);
        assert_eq!(msg.metadata["usage"]["total_tokens"], 2);
    }
}
