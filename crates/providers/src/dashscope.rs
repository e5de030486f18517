//! DashScope (Alibaba Cloud Model Studio) native API.
//!
//! Text generation goes to `/api/v1/services/aigc/text-generation/generation`,
//! or to the multimodal endpoint when a message carries images, audio or
//! video. Streaming uses SSE with `X-DashScope-SSE: enable` and
//! `incremental_output`, so every event carries only the new delta.
//! `enable_thinking` makes Qwen3 models return `reasoning_content`, which
//! becomes [`ContentBlock::Thinking`].

use agentscope_core::message::blocks_to_text;
use agentscope_core::{
    ChatModel, ChatRequest, ChatResponse, ChunkStream, ContentBlock, EmbeddingModel, ModelError,
    Msg, MsgRole, Usage,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::http::{self, LineBuffer};
use crate::openai::{
    done_chunk, format_messages, format_tool_choice, format_tools, source_url, ApiChoice, ApiUsage,
    DeltaState, StreamDelta,
};

pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com";

const TEXT_GENERATION_PATH: &str = "/api/v1/services/aigc/text-generation/generation";
const MULTIMODAL_GENERATION_PATH: &str = "/api/v1/services/aigc/multimodal-generation/generation";
const TEXT_EMBEDDING_PATH: &str = "/api/v1/services/embeddings/text-embedding/text-embedding";

pub struct DashScopeChatModel {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl DashScopeChatModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        Ok(Self {
            base_url: DASHSCOPE_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: http::build_client(Duration::from_secs(180))?,
        })
    }

    /// Use another region or a proxy (e.g. `https://dashscope-intl.aliyuncs.com`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, multimodal: bool) -> String {
        let path = if multimodal {
            MULTIMODAL_GENERATION_PATH
        } else {
            TEXT_GENERATION_PATH
        };
        format!("{}{}", self.base_url, path)
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> (serde_json::Value, bool) {
        let model = if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        };
        let opts = &request.options;
        let multimodal = needs_multimodal(&request.messages);
        let messages = if multimodal {
            format_multimodal_messages(&request.messages)
        } else {
            format_messages(&request.messages)
        };

        let mut parameters = serde_json::json!({
            "result_format": "message",
            "temperature": opts.temperature,
            "incremental_output": stream,
        });
        if let Some(max_tokens) = opts.max_tokens {
            parameters["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(top_p) = opts.top_p {
            parameters["top_p"] = serde_json::json!(top_p);
        }
        if !opts.stop.is_empty() {
            parameters["stop"] = serde_json::json!(opts.stop);
        }
        if opts.enable_thinking {
            parameters["enable_thinking"] = serde_json::json!(true);
        }
        if !request.tools.is_empty() {
            parameters["tools"] = serde_json::json!(format_tools(&request.tools));
            parameters["tool_choice"] = format_tool_choice(&opts.tool_choice);
        }

        let body = serde_json::json!({
            "model": model,
            "input": { "messages": messages },
            "parameters": parameters,
        });
        (body, multimodal)
    }
}

#[async_trait]
impl ChatModel for DashScopeChatModel {
    fn name(&self) -> &str {
        "dashscope"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let (body, multimodal) = self.build_body(&request, false);
        debug!(model = %body["model"], multimodal, "Sending DashScope generation request");

        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint(multimodal))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status("dashscope", response).await?;

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse response: {e}")))?;
        let mut result = parsed.into_chat_response(&self.model)?;
        if let Some(usage) = result.usage.as_mut() {
            usage.time_ms = started.elapsed().as_millis() as u64;
        }
        Ok(result)
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, ModelError> {
        let (body, multimodal) = self.build_body(&request, true);
        debug!(model = %body["model"], multimodal, "Sending DashScope streaming request");

        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint(multimodal))
            .bearer_auth(&self.api_key)
            .header("X-DashScope-SSE", "enable")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status("dashscope", response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut deltas = DeltaState::default();
            let mut usage = None;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    // "id:", "event:" and ":HTTP_STATUS/200" lines carry nothing we need
                    let Some(data) = http::sse_data(&line) else {
                        continue;
                    };
                    let event = match serde_json::from_str::<StreamEvent>(data) {
                        Ok(e) => e,
                        Err(e) => {
                            trace!(data = %data, error = %e, "Ignoring unparseable DashScope event");
                            continue;
                        }
                    };

                    if let Some(code) = event.code.filter(|c| !c.is_empty()) {
                        let message = event.message.unwrap_or_default();
                        let _ = tx
                            .send(Err(ModelError::StreamInterrupted(format!("{code}: {message}"))))
                            .await;
                        return;
                    }
                    if let Some(u) = event.usage {
                        usage = Some(Usage::from(u));
                    }

                    let Some(output) = event.output else {
                        continue;
                    };
                    let mut finished = false;
                    for choice in output.choices {
                        finished |= choice
                            .finish_reason
                            .as_deref()
                            .is_some_and(|r| !r.is_empty() && r != "null");
                        let chunk = deltas.chunk(&choice.message.into_delta());
                        if !chunk.content.is_empty() && tx.send(Ok(chunk)).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                    if finished {
                        let _ = tx.send(Ok(done_chunk(usage, started))).await;
                        return;
                    }
                }
            }

            let _ = tx.send(Ok(done_chunk(usage, started))).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let response = self
            .client
            .get(format!("{}/compatible-mode/v1/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status("dashscope", response).await?;
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

fn needs_multimodal(msgs: &[Msg]) -> bool {
    msgs.iter().flat_map(|m| &m.content).any(|b| {
        matches!(
            b,
            ContentBlock::Image { .. } | ContentBlock::Audio { .. } | ContentBlock::Video { .. }
        )
    })
}

/// Multimodal messages carry a list of `{"text"}`, `{"image"}`, `{"audio"}`
/// and `{"video"}` items instead of a content string.
fn format_multimodal_messages(msgs: &[Msg]) -> Vec<serde_json::Value> {
    let system = msgs.iter().filter(|m| m.role == MsgRole::System);
    let rest = msgs.iter().filter(|m| m.role != MsgRole::System);
    let mut out = Vec::new();
    for msg in system.chain(rest) {
        let mut content = Vec::new();
        for block in &msg.content {
            match block {
                ContentBlock::Text { text } => content.push(serde_json::json!({ "text": text })),
                ContentBlock::Image { source } => {
                    content.push(serde_json::json!({ "image": source_url(source) }))
                }
                ContentBlock::Audio { source } => {
                    content.push(serde_json::json!({ "audio": source_url(source) }))
                }
                ContentBlock::Video { source } => {
                    content.push(serde_json::json!({ "video": source_url(source) }))
                }
                ContentBlock::ToolResult { output, .. } => {
                    content.push(serde_json::json!({ "text": blocks_to_text(output) }))
                }
                ContentBlock::Thinking { .. } | ContentBlock::ToolUse { .. } => {}
            }
        }
        if content.is_empty() {
            continue;
        }
        let role = match msg.role {
            MsgRole::System => "system",
            MsgRole::Assistant => "assistant",
            MsgRole::User | MsgRole::Tool => "user",
        };
        out.push(serde_json::json!({ "role": role, "content": content }));
    }
    out
}

// --- Response types ---

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    request_id: Option<String>,
    output: GenerationOutput,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

impl GenerationResponse {
    fn into_chat_response(self, model: &str) -> Result<ChatResponse, ModelError> {
        let choice = self
            .output
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("No choices in DashScope output".into()))?;
        Ok(ChatResponse {
            id: self
                .request_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            content: choice.message.into_blocks(),
            usage: self.usage.map(Usage::from),
            model: model.to_string(),
            finish_reason: choice.finish_reason,
        })
    }
}

/// One SSE event of a streaming generation.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    output: Option<StreamOutput>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamOutput {
    #[serde(default)]
    choices: Vec<StreamEventChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamEventChoice {
    #[serde(default)]
    message: StreamEventMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Multimodal models send `content` as a list of `{"text"}` items.
#[derive(Debug, Default, Deserialize)]
struct StreamEventMessage {
    #[serde(default)]
    content: Option<serde_json::Value>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<serde_json::Value>,
}

impl StreamEventMessage {
    fn into_delta(self) -> StreamDelta {
        let content = match self.content {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|i| i["text"].as_str())
                    .collect::<Vec<_>>()
                    .join(""),
            ),
            _ => None,
        };
        StreamDelta {
            content,
            reasoning_content: self.reasoning_content,
            tool_calls: self
                .tool_calls
                .and_then(|v| serde_json::from_value(v).ok()),
        }
    }
}

/// Text embeddings (`text-embedding-v3`, `text-embedding-v4`).
pub struct DashScopeEmbeddingModel {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: Option<usize>,
    client: reqwest::Client,
}

impl DashScopeEmbeddingModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        Ok(Self {
            base_url: DASHSCOPE_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions: None,
            client: http::build_client(Duration::from_secs(60))?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    output: EmbeddingOutput,
}

#[derive(Debug, Deserialize)]
struct EmbeddingOutput {
    embeddings: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    text_index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingModel for DashScopeEmbeddingModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut body = serde_json::json!({
            "model": self.model,
            "input": { "texts": texts },
        });
        if let Some(d) = self.dimensions {
            body["parameters"] = serde_json::json!({ "dimension": d });
        }
        debug!(model = %self.model, count = texts.len(), "Sending DashScope embedding request");

        let response = self
            .client
            .post(format!("{}{}", self.base_url, TEXT_EMBEDDING_PATH))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status("dashscope", response).await?;

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            ModelError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;
        parsed.output.embeddings.sort_by_key(|e| e.text_index);
        Ok(parsed
            .output
            .embeddings
            .into_iter()
            .map(|e| e.embedding)
            .collect())
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscope_core::{ChunkAccumulator, GenerateOptions, Source, ToolSchema};

    fn model() -> DashScopeChatModel {
        DashScopeChatModel::new("sk-test", "qwen-plus").unwrap()
    }

    #[test]
    fn body_uses_message_result_format() {
        let mut request = ChatRequest::new("", vec![Msg::user("user", "hi")]);
        request.options = GenerateOptions {
            enable_thinking: true,
            max_tokens: Some(256),
            ..Default::default()
        };
        request.tools = vec![ToolSchema {
            name: "shell".into(),
            description: "run".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let (body, multimodal) = model().build_body(&request, true);
        assert!(!multimodal);
        assert_eq!(body["model"], "qwen-plus");
        assert_eq!(body["input"]["messages"][0]["content"], "hi");
        assert_eq!(body["parameters"]["result_format"], "message");
        assert_eq!(body["parameters"]["incremental_output"], true);
        assert_eq!(body["parameters"]["enable_thinking"], true);
        assert_eq!(body["parameters"]["max_tokens"], 256);
        assert_eq!(body["parameters"]["tools"][0]["function"]["name"], "shell");
    }

    #[test]
    fn images_switch_to_multimodal_endpoint() {
        let msg = Msg::builder()
            .text("describe")
            .block(ContentBlock::Image {
                source: Source::Url {
                    url: "https://example.com/cat.png".into(),
                },
            })
            .build();
        let m = model();
        let (body, multimodal) = m.build_body(&ChatRequest::new("qwen-vl-max", vec![msg]), false);
        assert!(multimodal);
        assert!(m.endpoint(multimodal).ends_with("multimodal-generation/generation"));
        let content = body["input"]["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content[0]["text"], "describe");
        assert_eq!(content[1]["image"], "https://example.com/cat.png");
    }

    #[test]
    fn parse_generation_with_reasoning() {
        let data = r#"{
            "output": {"choices": [{"finish_reason": "stop", "message": {
                "role": "assistant", "content": "42", "reasoning_content": "6 times 7"}}]},
            "usage": {"input_tokens": 12, "output_tokens": 3, "total_tokens": 15},
            "request_id": "req-1"
        }"#;
        let parsed: GenerationResponse = serde_json::from_str(data).unwrap();
        let response = parsed.into_chat_response("qwen3-max").unwrap();
        assert_eq!(response.id, "req-1");
        assert_eq!(
            response.content,
            vec![ContentBlock::thinking("6 times 7"), ContentBlock::text("42")]
        );
        let usage = response.usage.unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn incremental_events_accumulate() {
        let events = [
            r#"{"output":{"choices":[{"message":{"role":"assistant","content":"","reasoning_content":"think"},"finish_reason":"null"}]}}"#,
            r#"{"output":{"choices":[{"message":{"role":"assistant","content":"","tool_calls":[{"index":0,"id":"call_9","type":"function","function":{"name":"get_weather","arguments":"{\"city\":"}}]},"finish_reason":"null"}]}}"#,
            r#"{"output":{"choices":[{"message":{"role":"assistant","content":"","tool_calls":[{"index":0,"id":"","type":"function","function":{"arguments":"\"Hangzhou\"}"}}]},"finish_reason":"tool_calls"}]},"usage":{"input_tokens":5,"output_tokens":7,"total_tokens":12}}"#,
        ];
        let mut state = DeltaState::default();
        let mut acc = ChunkAccumulator::new();
        for raw in events {
            let event: StreamEvent = serde_json::from_str(raw).unwrap();
            for choice in event.output.unwrap().choices {
                acc.push(&state.chunk(&choice.message.into_delta()));
            }
        }
        let response = acc.finish("qwen-plus");
        assert_eq!(
            response.content,
            vec![
                ContentBlock::thinking("think"),
                ContentBlock::tool_use("call_9", "get_weather", serde_json::json!({"city": "Hangzhou"})),
            ]
        );
    }

    #[test]
    fn multimodal_stream_content_list() {
        let raw = r#"{"output":{"choices":[{"message":{"role":"assistant","content":[{"text":"A cat"}]},"finish_reason":"null"}]}}"#;
        let event: StreamEvent = serde_json::from_str(raw).unwrap();
        let delta = event
            .output
            .unwrap()
            .choices
            .into_iter()
            .next()
            .unwrap()
            .message
            .into_delta();
        assert_eq!(delta.content.as_deref(), Some("A cat"));
    }

    #[test]
    fn stream_error_event() {
        let raw = r#"{"code":"DataInspectionFailed","message":"Input data may contain inappropriate content.","request_id":"r"}"#;
        let event: StreamEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.code.as_deref(), Some("DataInspectionFailed"));
        assert!(event.output.is_none());
    }

    #[test]
    fn parse_embedding_output() {
        let raw = r#"{"output":{"embeddings":[{"text_index":1,"embedding":[0.3]},{"text_index":0,"embedding":[0.1]}]},"usage":{"total_tokens":4}}"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        parsed.output.embeddings.sort_by_key(|e| e.text_index);
        assert_eq!(parsed.output.embeddings[0].embedding, vec![0.1]);
    }
}
