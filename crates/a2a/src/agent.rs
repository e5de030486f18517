//! Remote agent — an [`Agent`] backed by an A2A server.
//!
//! Each call sends the observed and new messages as one A2A message and
//! turns the resulting task back into a reply. The conversation's
//! `contextId` is kept across calls so the server keeps the same session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentscope_core::agent::EVENT_BUFFER;
use agentscope_core::error::{AgentError, Result};
use agentscope_core::model::Usage;
use agentscope_core::{Agent, AgentEvent, ContentBlock, Msg};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::A2aClient;
use crate::convert::{merge_artifact, message_to_msg, msgs_to_message, task_to_msg};
use crate::error::A2aError;
use crate::types::{AgentCard, Message, MessageSendParams, SendMessageResult, StreamResponse, Task, TaskState};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An agent living behind an A2A endpoint.
#[derive(Clone)]
pub struct A2aAgent {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    name: String,
    client: A2aClient,
    streaming: bool,
    context_id: Mutex<Option<String>>,
    /// Task in flight, or paused waiting for input.
    open_task: Mutex<Option<String>>,
    /// Observed messages not yet sent.
    pending: Mutex<Vec<Msg>>,
}

impl A2aAgent {
    pub fn new(name: impl Into<String>, client: A2aClient) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.into(),
                client,
                streaming: false,
                context_id: Mutex::new(None),
                open_task: Mutex::new(None),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// An agent for the server described by `card`. Streams when the card
    /// says the server can.
    pub fn from_card(card: &AgentCard) -> std::result::Result<Self, A2aError> {
        Ok(Self::new(card.name.as_str(), A2aClient::from_card(card)?).with_streaming(card.capabilities.streaming))
    }

    /// Fetch the card at `base_url` and build an agent from it.
    pub async fn connect(base_url: &str) -> std::result::Result<Self, A2aError> {
        let card = A2aClient::fetch_agent_card(base_url).await?;
        Self::from_card(&card)
    }

    /// Use `message/stream` for [`Agent::stream`].
    ///
    /// Only valid before the agent is shared.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.streaming = streaming;
        }
        self
    }

    /// The A2A context this agent's conversation runs in, once known.
    pub fn context_id(&self) -> Option<String> {
        lock(&self.inner.context_id).clone()
    }

    pub fn client(&self) -> &A2aClient {
        &self.inner.client
    }
}

/// What a streamed exchange settles on.
enum Settled {
    Task(Task),
    /// The server answered with a plain message.
    Reply(Msg),
}

impl Inner {
    /// Build the outgoing message. Also returns the observed messages it
    /// drained, for [`abandon`](Self::abandon).
    fn prepare(&self, msgs: Vec<Msg>) -> (Message, Vec<Msg>) {
        let observed = std::mem::take(&mut *lock(&self.pending));
        let mut all = observed.clone();
        all.extend(msgs);
        let mut message = msgs_to_message(&all);
        message.context_id = lock(&self.context_id).clone();
        message.task_id = lock(&self.open_task).clone();
        (message, observed)
    }

    /// Reset after a failed exchange: the open task cannot be continued and
    /// the observed messages go back in front of anything observed since.
    fn abandon(&self, observed: Vec<Msg>, error: A2aError) -> agentscope_core::Error {
        let task_id = lock(&self.open_task).take();
        warn!(agent = %self.name, task_id = ?task_id, error = %error, "A2A exchange failed");
        let mut pending = lock(&self.pending);
        let later = std::mem::replace(&mut *pending, observed);
        pending.extend(later);
        error.into()
    }

    fn remember(&self, context_id: Option<&str>, task_id: Option<&str>) {
        if let Some(ctx) = context_id {
            *lock(&self.context_id) = Some(ctx.to_string());
        }
        if let Some(task) = task_id {
            *lock(&self.open_task) = Some(task.to_string());
        }
    }

    async fn send(&self, msgs: Vec<Msg>) -> Result<Msg> {
        let (message, observed) = self.prepare(msgs);
        debug!(agent = %self.name, endpoint = %self.client.endpoint(), "Sending A2A message");
        let result = match self.client.send_message(MessageSendParams::new(message)).await {
            Ok(result) => result,
            Err(e) => return Err(self.abandon(observed, e)),
        };
        match result {
            SendMessageResult::Message(reply) => {
                self.remember(reply.context_id.as_deref(), None);
                Ok(message_to_msg(&reply, &self.name))
            }
            SendMessageResult::Task(task) => {
                self.remember(Some(&task.context_id), Some(&task.id));
                self.finish_task(task)
            }
        }
    }

    async fn send_streaming(&self, msgs: Vec<Msg>, tx: &mpsc::Sender<AgentEvent>) -> Result<Msg> {
        let (message, observed) = self.prepare(msgs);
        debug!(agent = %self.name, endpoint = %self.client.endpoint(), "Streaming A2A message");
        match self.stream_task(message, tx).await {
            Ok(Settled::Task(task)) => self.finish_task(task),
            Ok(Settled::Reply(reply)) => Ok(reply),
            Err(e) => Err(self.abandon(observed, e)),
        }
    }

    /// Follow a streamed exchange until the task settles.
    async fn stream_task(
        &self,
        message: Message,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> std::result::Result<Settled, A2aError> {
        let mut rx = self
            .client
            .send_message_streaming(MessageSendParams::new(message))
            .await?;

        let mut task: Option<Task> = None;
        // Artifacts whose text already went out as chunks
        let mut streamed: HashSet<String> = HashSet::new();

        while let Some(item) = rx.recv().await {
            match item? {
                StreamResponse::Message(reply) => {
                    self.remember(reply.context_id.as_deref(), None);
                    return Ok(Settled::Reply(message_to_msg(&reply, &self.name)));
                }
                StreamResponse::Task(t) => {
                    self.remember(Some(&t.context_id), Some(&t.id));
                    let done = t.status.state.is_terminal();
                    task = Some(t);
                    if done {
                        break;
                    }
                }
                StreamResponse::StatusUpdate(update) => {
                    self.remember(Some(&update.context_id), Some(&update.task_id));
                    if let Some(status_msg) = &update.status.message {
                        self.emit_tool_events(status_msg, tx).await;
                    }
                    let current = task.get_or_insert_with(|| Task::new(&update.task_id, &update.context_id));
                    current.status = update.status;
                    if update.is_final {
                        break;
                    }
                }
                StreamResponse::ArtifactUpdate(update) => {
                    self.remember(Some(&update.context_id), Some(&update.task_id));
                    let id = update.artifact.artifact_id.clone();
                    let text: String = update.artifact.parts.iter().filter_map(|p| p.as_text()).collect();
                    let fresh = update.append || !streamed.contains(&id);
                    if fresh && !text.is_empty() {
                        let _ = tx.send(AgentEvent::ReasoningChunk { text }).await;
                        if update.append {
                            streamed.insert(id);
                        }
                    }
                    let current = task.get_or_insert_with(|| Task::new(&update.task_id, &update.context_id));
                    merge_artifact(&mut current.artifacts, &update);
                }
            }
        }

        task.map(Settled::Task)
            .ok_or_else(|| A2aError::InvalidResponse("stream ended without a task".into()))
    }

    async fn emit_tool_events(&self, message: &Message, tx: &mpsc::Sender<AgentEvent>) {
        let msg = message_to_msg(message, &self.name);
        for block in &msg.content {
            let event = match block {
                ContentBlock::ToolUse { id, name, input } => Some(AgentEvent::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                ContentBlock::ToolResult { .. } => AgentEvent::from_tool_result(block),
                _ => None,
            };
            if let Some(event) = event {
                let _ = tx.send(event).await;
            }
        }
    }

    fn finish_task(&self, task: Task) -> Result<Msg> {
        let state = task.status.state;
        if !state.is_interrupted() {
            *lock(&self.open_task) = None;
        }
        debug!(agent = %self.name, task_id = %task.id, state = %state, "A2A task finished");

        match state {
            TaskState::Failed | TaskState::Rejected => {
                let message = task
                    .status
                    .message
                    .as_ref()
                    .map(|m| m.text())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "no details".into());
                Err(A2aError::TaskFailed {
                    task_id: task.id,
                    state,
                    message,
                }
                .into())
            }
            TaskState::Canceled => Err(AgentError::Interrupted(self.name.clone()).into()),
            _ => {
                let reply = task_to_msg(&task, &self.name).unwrap_or_else(|| Msg::assistant(self.name.as_str(), ""));
                Ok(reply
                    .with_metadata("task_id", serde_json::json!(task.id))
                    .with_metadata("context_id", serde_json::json!(task.context_id))
                    .with_metadata("task_state", serde_json::json!(state.to_string())))
            }
        }
    }
}

#[async_trait]
impl Agent for A2aAgent {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn call(&self, msgs: Vec<Msg>) -> Result<Msg> {
        self.inner.send(msgs).await
    }

    async fn observe(&self, msgs: Vec<Msg>) -> Result<()> {
        lock(&self.inner.pending).extend(msgs);
        Ok(())
    }

    async fn stream(&self, msgs: Vec<Msg>) -> Result<mpsc::Receiver<AgentEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = if inner.streaming {
                inner.send_streaming(msgs, &tx).await
            } else {
                inner.send(msgs).await
            };
            let event = match result {
                Ok(msg) => AgentEvent::Done {
                    msg,
                    iterations: 1,
                    usage: Usage::default(),
                },
                Err(e) => AgentEvent::Error { message: e.to_string() },
            };
            let _ = tx.send(event).await;
        });
        Ok(rx)
    }

    async fn interrupt(&self) {
        let task_id = lock(&self.inner.open_task).clone();
        let Some(task_id) = task_id else {
            return;
        };
        if let Err(e) = self.inner.client.cancel_task(&task_id).await {
            warn!(agent = %self.inner.name, task_id = %task_id, error = %e, "Failed to cancel remote task");
        }
    }
}
