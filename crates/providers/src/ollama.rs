//! Ollama native API.
//!
//! `/api/chat` streams newline-delimited JSON rather than SSE. Tool calls
//! arrive complete (arguments as an object) and without ids, so ids are
//! synthesized per response.

use agentscope_core::message::blocks_to_text;
use agentscope_core::{
    ChatChunk, ChatModel, ChatRequest, ChatResponse, ChunkStream, ContentBlock, EmbeddingModel,
    ModelError, Msg, MsgRole, Source, Usage,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::http::{self, LineBuffer};
use crate::openai::format_tools;

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaChatModel {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaChatModel {
    pub fn new(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, ModelError> {
        Ok(Self {
            base_url: base_url
                .unwrap_or(OLLAMA_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
            // Local models can take a while to load on first use
            client: http::build_client(Duration::from_secs(300))?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let model = if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        };
        let opts = &request.options;

        let mut options = serde_json::json!({ "temperature": opts.temperature });
        if let Some(max_tokens) = opts.max_tokens {
            options["num_predict"] = serde_json::json!(max_tokens);
        }
        if let Some(top_p) = opts.top_p {
            options["top_p"] = serde_json::json!(top_p);
        }
        if !opts.stop.is_empty() {
            options["stop"] = serde_json::json!(opts.stop);
        }

        let mut body = serde_json::json!({
            "model": model,
            "messages": format_messages(&request.messages),
            "stream": stream,
            "options": options,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(format_tools(&request.tools));
        }
        if opts.enable_thinking {
            body["think"] = serde_json::json!(true);
        }
        body
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let body = self.build_body(&request, false);
        debug!(model = %body["model"], "Sending Ollama chat request");

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status("ollama", response).await?;

        let parsed: ChatFrame = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse response: {e}")))?;
        let mut ids = ToolIds::default();
        let usage = parsed.usage().map(|mut u| {
            u.time_ms = started.elapsed().as_millis() as u64;
            u
        });
        Ok(ChatResponse {
            id: uuid::Uuid::new_v4().to_string(),
            model: parsed.model.clone().unwrap_or_else(|| self.model.clone()),
            finish_reason: parsed.done_reason.clone(),
            content: parsed.message.into_blocks(&mut ids),
            usage,
        })
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, ModelError> {
        let body = self.build_body(&request, true);
        debug!(model = %body["model"], "Sending Ollama streaming request");

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status("ollama", response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut ids = ToolIds::default();

            let handle = |line: &str, ids: &mut ToolIds| -> Option<Result<ChatChunk, ModelError>> {
                if line.trim().is_empty() {
                    return None;
                }
                match serde_json::from_str::<ChatFrame>(line) {
                    Ok(frame) => Some(frame.into_chunk(ids, started)),
                    Err(e) => {
                        trace!(line = %line, error = %e, "Ignoring unparseable Ollama frame");
                        None
                    }
                }
            };

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };
                for line in lines.push(&bytes) {
                    let Some(item) = handle(&line, &mut ids) else {
                        continue;
                    };
                    let last = matches!(&item, Ok(c) if c.done) || item.is_err();
                    if tx.send(item).await.is_err() || last {
                        return;
                    }
                }
            }

            if let Some(rest) = lines.finish()
                && let Some(item) = handle(&rest, &mut ids)
            {
                let last = matches!(&item, Ok(c) if c.done) || item.is_err();
                let _ = tx.send(item).await;
                if last {
                    return;
                }
            }
            let _ = tx
                .send(Ok(ChatChunk {
                    done: true,
                    ..Default::default()
                }))
                .await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status("ollama", response).await?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Ollama messages: plain `content`, base64 `images`, object tool arguments.
fn format_messages(msgs: &[Msg]) -> Vec<serde_json::Value> {
    let system = msgs.iter().filter(|m| m.role == MsgRole::System);
    let rest = msgs.iter().filter(|m| m.role != MsgRole::System);
    let mut out = Vec::new();

    for msg in system.chain(rest) {
        let mut texts = Vec::new();
        let mut images = Vec::new();
        let mut tool_calls = Vec::new();

        for block in &msg.content {
            match block {
                ContentBlock::Text { text } => texts.push(text.as_str()),
                ContentBlock::Image {
                    source: Source::Base64 { data, .. },
                } => images.push(data.clone()),
                ContentBlock::ToolUse { name, input, .. } => tool_calls.push(serde_json::json!({
                    "function": { "name": name, "arguments": input },
                })),
                ContentBlock::ToolResult { name, output, .. } => out.push(serde_json::json!({
                    "role": "tool",
                    "tool_name": name,
                    "content": blocks_to_text(output),
                })),
                _ => {}
            }
        }

        if texts.is_empty() && images.is_empty() && tool_calls.is_empty() {
            continue;
        }
        let role = match msg.role {
            MsgRole::System => "system",
            MsgRole::Assistant => "assistant",
            MsgRole::User | MsgRole::Tool => "user",
        };
        let mut obj = serde_json::json!({ "role": role, "content": texts.join("\n") });
        if !images.is_empty() {
            obj["images"] = serde_json::json!(images);
        }
        if !tool_calls.is_empty() {
            obj["tool_calls"] = serde_json::Value::Array(tool_calls);
        }
        out.push(obj);
    }
    out
}

/// Synthesizes tool-call ids, unique within one response.
#[derive(Debug, Default)]
struct ToolIds {
    next: usize,
}

impl ToolIds {
    fn next(&mut self) -> String {
        let id = format!("call_{}_{}", self.next, &uuid::Uuid::new_v4().simple().to_string()[..8]);
        self.next += 1;
        id
    }
}

/// One `/api/chat` frame (the whole response when not streaming).
#[derive(Debug, Deserialize)]
struct ChatFrame {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: FrameMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl ChatFrame {
    fn usage(&self) -> Option<Usage> {
        if self.prompt_eval_count.is_none() && self.eval_count.is_none() {
            return None;
        }
        Some(Usage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        ))
    }

    fn into_chunk(self, ids: &mut ToolIds, started: Instant) -> Result<ChatChunk, ModelError> {
        if let Some(error) = self.error {
            return Err(ModelError::StreamInterrupted(error));
        }
        let usage = if self.done {
            self.usage().map(|mut u| {
                u.time_ms = started.elapsed().as_millis() as u64;
                u
            })
        } else {
            None
        };
        Ok(ChatChunk {
            content: self.message.into_blocks(ids),
            done: self.done,
            usage,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct FrameMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Vec<FrameToolCall>,
}

impl FrameMessage {
    fn into_blocks(self, ids: &mut ToolIds) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        if let Some(thinking) = self.thinking.filter(|t| !t.is_empty()) {
            blocks.push(ContentBlock::thinking(thinking));
        }
        if !self.content.is_empty() {
            blocks.push(ContentBlock::text(self.content));
        }
        for tc in self.tool_calls {
            let arguments = match tc.function.arguments {
                serde_json::Value::Null => serde_json::json!({}),
                // Some models emit the arguments as a JSON string
                serde_json::Value::String(raw) => {
                    agentscope_core::model::parse_arguments(&raw)
                }
                other => other,
            };
            blocks.push(ContentBlock::tool_use(ids.next(), tc.function.name, arguments));
        }
        blocks
    }
}

#[derive(Debug, Deserialize)]
struct FrameToolCall {
    function: FrameFunction,
}

#[derive(Debug, Deserialize)]
struct FrameFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// `/api/embed` embeddings (e.g. `nomic-embed-text`).
pub struct OllamaEmbeddingModel {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbeddingModel {
    pub fn new(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, ModelError> {
        Ok(Self {
            base_url: base_url
                .unwrap_or(OLLAMA_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
            client: http::build_client(Duration::from_secs(120))?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddingModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status("ollama", response).await?;
        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            ModelError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;
        Ok(parsed.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_url() {
        let model = OllamaChatModel::new(None, "qwen3:8b").unwrap();
        assert_eq!(model.base_url(), "http://localhost:11434");
        assert_eq!(model.name(), "ollama");
    }

    #[test]
    fn body_maps_options() {
        let model = OllamaChatModel::new(Some("http://gpu:11434/"), "llama3.1").unwrap();
        let mut request = ChatRequest::new("", vec![Msg::user("user", "hi")]);
        request.options.max_tokens = Some(64);
        request.options.enable_thinking = true;
        let body = model.build_body(&request, false);
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["options"]["num_predict"], 64);
        assert_eq!(body["think"], true);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn messages_carry_images_and_tool_results() {
        let user = Msg::builder()
            .text("look")
            .block(ContentBlock::Image {
                source: Source::Base64 {
                    media_type: "image/jpeg".into(),
                    data: "AAAA".into(),
                },
            })
            .build();
        let assistant = Msg::new(
            "bot",
            MsgRole::Assistant,
            vec![ContentBlock::tool_use("c1", "weather", serde_json::json!({"city": "Paris"}))],
        );
        let tool = Msg::new(
            "system",
            MsgRole::Tool,
            vec![ContentBlock::tool_result("c1", "weather", vec![ContentBlock::text("sunny")], false)],
        );
        let api = format_messages(&[user, assistant, tool]);
        assert_eq!(api[0]["images"][0], "AAAA");
        assert_eq!(api[1]["tool_calls"][0]["function"]["arguments"]["city"], "Paris");
        assert_eq!(api[2]["role"], "tool");
        assert_eq!(api[2]["tool_name"], "weather");
        assert_eq!(api[2]["content"], "sunny");
    }

    #[test]
    fn frames_become_chunks_with_synthesized_ids() {
        let mut ids = ToolIds::default();
        let started = Instant::now();
        let frame: ChatFrame = serde_json::from_str(
            r#"{"model":"qwen3","message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"weather","arguments":{"city":"Paris"}}},{"function":{"name":"time","arguments":{}}}]},"done":false}"#,
        )
        .unwrap();
        let chunk = frame.into_chunk(&mut ids, started).unwrap();
        assert!(!chunk.done);
        let ids: Vec<_> = chunk
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let last: ChatFrame = serde_json::from_str(
            r#"{"model":"qwen3","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","prompt_eval_count":26,"eval_count":12}"#,
        )
        .unwrap();
        let chunk = last.into_chunk(&mut ToolIds::default(), started).unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.usage.unwrap().total_tokens, 38);
    }

    #[test]
    fn error_frame_interrupts_stream() {
        let frame: ChatFrame = serde_json::from_str(r#"{"error":"model not loaded"}"#).unwrap();
        assert!(matches!(
            frame.into_chunk(&mut ToolIds::default(), Instant::now()),
            Err(ModelError::StreamInterrupted(_))
        ));
    }

    #[test]
    fn thinking_field_becomes_thinking_block() {
        let frame: ChatFrame =
            serde_json::from_str(r#"{"message":{"content":"Hi","thinking":"greet"},"done":false}"#).unwrap();
        let blocks = frame.message.into_blocks(&mut ToolIds::default());
        assert_eq!(
            blocks,
            vec![ContentBlock::thinking("greet"), ContentBlock::text("Hi")]
        );
    }

    #[test]
    fn parse_tags() {
        let tags: TagsResponse =
            serde_json::from_str(r#"{"models":[{"name":"qwen3:8b","size":1},{"name":"nomic-embed-text"}]}"#).unwrap();
        let names: Vec<_> = tags.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["qwen3:8b", "nomic-embed-text"]);
    }
}
