//! Scripted models and inputs for exercising agents without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use agentscope_core::error::{AgentError, ModelError};
use agentscope_core::model::{ChatChunk, ChatModel, ChatRequest, ChatResponse, ChunkStream, Usage};
use agentscope_core::ContentBlock;
use async_trait::async_trait;

use crate::user::InputSource;

/// A model that returns a sequence of scripted responses.
///
/// Each call returns the next response in the queue; once the queue is
/// empty it fails with `InvalidResponse`. Every request is recorded.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<ChatResponse, ModelError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<std::time::Duration>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A model that answers once with `text`.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![text_response(text)])
    }

    /// Append an error to the script.
    pub fn then_error(self, error: ModelError) -> Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    /// Sleep before every response.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    async fn next(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        lock(&self.requests).push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::InvalidResponse("script exhausted".into())))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        self.next(request).await
    }

    /// Streams text word by word, then the remaining blocks in a final chunk.
    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, ModelError> {
        let response = self.next(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            let mut rest = Vec::new();
            for block in response.content {
                match block {
                    ContentBlock::Text { text } => {
                        for word in text.split_inclusive(' ') {
                            let _ = tx.send(Ok(ChatChunk::text(word))).await;
                        }
                    }
                    other => rest.push(other),
                }
            }
            let _ = tx
                .send(Ok(ChatChunk {
                    content: rest,
                    done: true,
                    usage: response.usage,
                }))
                .await;
        });
        Ok(rx)
    }
}

/// A plain text response.
pub fn text_response(text: &str) -> ChatResponse {
    response(vec![ContentBlock::text(text)])
}

/// A response requesting one tool call, with an optional thought.
pub fn tool_response(id: &str, name: &str, input: serde_json::Value, thought: &str) -> ChatResponse {
    let mut content = Vec::new();
    if !thought.is_empty() {
        content.push(ContentBlock::text(thought));
    }
    content.push(ContentBlock::tool_use(id, name, input));
    response(content)
}

pub fn response(content: Vec<ContentBlock>) -> ChatResponse {
    ChatResponse {
        id: uuid::Uuid::new_v4().to_string(),
        content,
        usage: Some(Usage::new(10, 5)),
        model: "scripted-model".into(),
        finish_reason: None,
    }
}

/// Input source replaying fixed lines, then reporting end of input.
pub struct ScriptedInput {
    lines: Mutex<VecDeque<String>>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl InputSource for ScriptedInput {
    async fn read_line(&self, _prompt: &str) -> Result<Option<String>, AgentError> {
        Ok(lock(&self.lines).pop_front())
    }
}
