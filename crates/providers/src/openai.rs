//! OpenAI-compatible chat model.
//!
//! Works with: OpenAI, DashScope compatible mode, vLLM, DeepSeek, and any
//! endpoint exposing `/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling
//! - Image inputs as `image_url` parts
//! - Embeddings and model listing

use agentscope_core::message::blocks_to_text;
use agentscope_core::model::parse_arguments;
use agentscope_core::{
    ChatChunk, ChatModel, ChatRequest, ChatResponse, ChunkStream, ContentBlock, EmbeddingModel,
    ModelError, Msg, MsgRole, Source, ToolChoice, ToolSchema, Usage,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::http::{self, LineBuffer};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A chat model behind an OpenAI-compatible endpoint.
pub struct OpenAiChatModel {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            client: http::build_client(Duration::from_secs(120))?,
        })
    }

    /// OpenAI itself (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        Self::new("openai", OPENAI_BASE_URL, Some(api_key.into()), model)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let model = if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        };
        let opts = &request.options;

        let mut body = serde_json::json!({
            "model": model,
            "messages": format_messages(&request.messages),
            "temperature": opts.temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = opts.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(top_p) = opts.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if !opts.stop.is_empty() {
            body["stop"] = serde_json::json!(opts.stop);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(format_tools(&request.tools));
            body["tool_choice"] = format_tool_choice(&opts.tool_choice);
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let body = self.build_body(&request, false);
        debug!(provider = %self.name, model = %body["model"], "Sending completion request");

        let started = Instant::now();
        let response = self
            .post("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status(&self.name, response).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let mut parsed = api_response.into_chat_response(&self.model)?;
        if let Some(usage) = parsed.usage.as_mut() {
            usage.time_ms = started.elapsed().as_millis() as u64;
        }
        Ok(parsed)
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, ModelError> {
        let body = self.build_body(&request, true);
        debug!(provider = %self.name, model = %body["model"], "Sending streaming request");

        let started = Instant::now();
        let response = self
            .post("/chat/completions")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status(&self.name, response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut deltas = DeltaState::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    let Some(data) = http::sse_data(&line) else {
                        continue;
                    };

                    // "[DONE]" signals end of stream
                    if data == "[DONE]" {
                        let _ = tx.send(Ok(done_chunk(None, started))).await;
                        return;
                    }

                    let stream_resp = match serde_json::from_str::<StreamResponse>(data) {
                        Ok(r) => r,
                        Err(e) => {
                            trace!(provider = %provider_name, data = %data, error = %e, "Ignoring unparseable SSE chunk");
                            continue;
                        }
                    };

                    if let Some(error) = stream_resp.error {
                        let _ = tx.send(Err(ModelError::StreamInterrupted(error.message))).await;
                        return;
                    }

                    if let Some(choice) = stream_resp.choices.first() {
                        let chunk = deltas.chunk(&choice.delta);
                        if !chunk.content.is_empty() && tx.send(Ok(chunk)).await.is_err() {
                            return; // receiver dropped
                        }
                    }

                    // Usage arrives in the last chunk when include_usage is set
                    if let Some(usage) = stream_resp.usage {
                        let _ = tx.send(Ok(done_chunk(Some(usage.into()), started))).await;
                        return;
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(done_chunk(None, started))).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let mut builder = self.client.get(format!("{}/models", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(http::network_error)?;
        let response = http::check_status(&self.name, response).await?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub(crate) fn done_chunk(usage: Option<Usage>, started: Instant) -> ChatChunk {
    ChatChunk {
        content: Vec::new(),
        done: true,
        usage: usage.map(|mut u| {
            u.time_ms = started.elapsed().as_millis() as u64;
            u
        }),
    }
}

/// An embedding model behind an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddingModel {
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: Option<usize>,
    client: reqwest::Client,
}

impl OpenAiEmbeddingModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            dimensions: None,
            client: http::build_client(Duration::from_secs(60))?,
        })
    }

    /// Request vectors of this size (text-embedding-3 models).
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
        });
        if let Some(d) = self.dimensions {
            body["dimensions"] = serde_json::json!(d);
        }
        debug!(model = %self.model, count = texts.len(), "Sending embedding request");

        let mut builder = self.client.post(format!("{}/embeddings", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.json(&body).send().await.map_err(http::network_error)?;
        let response = http::check_status("openai", response).await?;

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ModelError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;
        Ok(api_resp.into_vectors())
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

// --- Request formatting ---

/// Convert messages to the OpenAI chat format.
///
/// System messages are moved to the front. Each tool result becomes its
/// own `role: "tool"` message; thinking blocks are not sent back.
pub(crate) fn format_messages(msgs: &[Msg]) -> Vec<serde_json::Value> {
    let system = msgs.iter().filter(|m| m.role == MsgRole::System);
    let rest = msgs.iter().filter(|m| m.role != MsgRole::System);
    system.chain(rest).flat_map(format_msg).collect()
}

fn format_msg(msg: &Msg) -> Vec<serde_json::Value> {
    let mut parts = Vec::new();
    let mut has_media = false;
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();

    for block in &msg.content {
        match block {
            ContentBlock::Text { text } => {
                parts.push(serde_json::json!({ "type": "text", "text": text }));
            }
            ContentBlock::Image { source } => {
                has_media = true;
                parts.push(serde_json::json!({
                    "type": "image_url",
                    "image_url": { "url": source_url(source) },
                }));
            }
            ContentBlock::Audio {
                source: Source::Base64 { media_type, data },
            } => {
                has_media = true;
                let format = media_type.rsplit('/').next().unwrap_or("wav");
                parts.push(serde_json::json!({
                    "type": "input_audio",
                    "input_audio": { "data": data, "format": format },
                }));
            }
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(serde_json::json!({
                    "id": id,
                    "type": "function",
                    "function": { "name": name, "arguments": input.to_string() },
                }));
            }
            ContentBlock::ToolResult { id, output, .. } => {
                tool_results.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": blocks_to_text(output),
                }));
            }
            ContentBlock::Thinking { .. } | ContentBlock::Audio { .. } | ContentBlock::Video { .. } => {}
        }
    }

    let mut out = Vec::new();
    if !parts.is_empty() || !tool_calls.is_empty() {
        let role = match msg.role {
            MsgRole::System => "system",
            MsgRole::Assistant => "assistant",
            MsgRole::User | MsgRole::Tool => "user",
        };
        let content = if has_media {
            serde_json::Value::Array(parts)
        } else if parts.is_empty() {
            serde_json::Value::Null
        } else {
            let text: Vec<&str> = parts.iter().filter_map(|p| p["text"].as_str()).collect();
            serde_json::Value::String(text.join("\n"))
        };
        let mut obj = serde_json::json!({ "role": role, "content": content });
        if !tool_calls.is_empty() {
            obj["tool_calls"] = serde_json::Value::Array(tool_calls);
        }
        out.push(obj);
    }
    out.extend(tool_results);
    out
}

pub(crate) fn source_url(source: &Source) -> String {
    match source {
        Source::Url { url } => url.clone(),
        Source::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
    }
}

pub(crate) fn format_tools(tools: &[ToolSchema]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                },
            })
        })
        .collect()
}

pub(crate) fn format_tool_choice(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Auto => "auto".into(),
        ToolChoice::None => "none".into(),
        ToolChoice::Required => "required".into(),
        ToolChoice::Specific(name) => serde_json::json!({
            "type": "function",
            "function": { "name": name },
        }),
    }
}

// --- Response parsing (shared with DashScope, which uses the same shapes) ---

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

impl ApiResponse {
    fn into_chat_response(self, default_model: &str) -> Result<ChatResponse, ModelError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("No choices in response".into()))?;
        Ok(ChatResponse {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            content: choice.message.into_blocks(),
            usage: self.usage.map(Usage::from),
            model: self.model.unwrap_or_else(|| default_model.to_string()),
            finish_reason: choice.finish_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiChoice {
    pub(crate) message: ApiResponseMessage,
    #[serde(default)]
    pub(crate) finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

impl ApiResponseMessage {
    /// Thinking first, then text, then tool uses.
    pub(crate) fn into_blocks(self) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        if let Some(thinking) = self.reasoning_content.filter(|t| !t.is_empty()) {
            blocks.push(ContentBlock::thinking(thinking));
        }
        if let Some(text) = self.content.filter(|t| !t.is_empty()) {
            blocks.push(ContentBlock::text(text));
        }
        for (i, tc) in self.tool_calls.unwrap_or_default().into_iter().enumerate() {
            let id = tc.id.filter(|id| !id.is_empty()).unwrap_or_else(|| format!("call_{i}"));
            blocks.push(ContentBlock::tool_use(
                id,
                tc.function.name,
                parse_arguments(&tc.function.arguments),
            ));
        }
        blocks
    }
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Token counts in either OpenAI (`prompt_tokens`) or DashScope
/// (`input_tokens`) naming.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiUsage {
    #[serde(default, alias = "input_tokens")]
    prompt_tokens: u32,
    #[serde(default, alias = "output_tokens")]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        let mut usage = Usage::new(u.prompt_tokens, u.completion_tokens);
        if let Some(total) = u.total_tokens {
            usage.total_tokens = total;
        }
        usage
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingApiResponse {
    fn into_vectors(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|d| d.index);
        self.data.into_iter().map(|d| d.embedding).collect()
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamDelta {
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) reasoning_content: Option<String>,
    #[serde(default)]
    pub(crate) tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Turns OpenAI-shaped deltas into [`ChatChunk`]s.
///
/// Tool-call deltas are keyed by index; only the first one carries the id,
/// so the id seen for each index is remembered and attached to every
/// argument fragment that follows.
#[derive(Debug, Default)]
pub(crate) struct DeltaState {
    ids: HashMap<u32, String>,
}

impl DeltaState {
    pub(crate) fn chunk(&mut self, delta: &StreamDelta) -> ChatChunk {
        let mut content = Vec::new();
        if let Some(thinking) = delta.reasoning_content.as_ref().filter(|t| !t.is_empty()) {
            content.push(ContentBlock::thinking(thinking.clone()));
        }
        if let Some(text) = delta.content.as_ref().filter(|t| !t.is_empty()) {
            content.push(ContentBlock::text(text.clone()));
        }
        for tc in delta.tool_calls.iter().flatten() {
            let id = match tc.id.as_ref().filter(|id| !id.is_empty()) {
                Some(id) => self.ids.entry(tc.index).or_insert_with(|| id.clone()).clone(),
                None => self
                    .ids
                    .entry(tc.index)
                    .or_insert_with(|| format!("call_{}", tc.index))
                    .clone(),
            };
            let name = tc
                .function
                .as_ref()
                .and_then(|f| f.name.clone())
                .unwrap_or_default();
            let fragment = tc
                .function
                .as_ref()
                .and_then(|f| f.arguments.clone())
                .unwrap_or_default();
            content.push(ContentBlock::tool_use(id, name, serde_json::Value::String(fragment)));
        }
        ChatChunk {
            content,
            done: false,
            usage: None,
        }
    }
}
