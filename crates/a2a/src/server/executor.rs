//! Agent executors — the bridge between A2A tasks and AgentScope agents.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentscope_core::{Agent, AgentEvent, ContentBlock, Msg, MsgRole};
use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use super::queue::EventQueue;
use crate::convert::{message_to_msg, msg_to_message};
use crate::error::A2aError;
use crate::types::{
    Artifact, Message, Part, StreamResponse, Task, TaskArtifactUpdateEvent, TaskState, TaskStatus,
    TaskStatusUpdateEvent,
};

/// Artifact id of an agent's reply.
pub const REPLY_ARTIFACT: &str = "reply";

/// Sessions kept for `contextId` reuse.
pub const DEFAULT_MAX_SESSIONS: usize = 100;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What an executor gets to work on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub task_id: String,
    pub context_id: String,
    /// The incoming user message.
    pub message: Message,
    /// The task being continued, if any.
    pub task: Option<Task>,
}

/// Runs tasks, reporting progress through an [`EventQueue`].
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Work on the task until it reaches a final state.
    async fn execute(&self, ctx: RequestContext, queue: Arc<EventQueue>) -> Result<(), A2aError>;

    /// Stop the task and report it canceled.
    async fn cancel(&self, ctx: RequestContext, queue: Arc<EventQueue>) -> Result<(), A2aError>;
}

/// Helper for publishing a task's status and artifact updates.
pub struct TaskUpdater {
    queue: Arc<EventQueue>,
    task_id: String,
    context_id: String,
}

impl TaskUpdater {
    pub fn new(queue: Arc<EventQueue>, task_id: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            queue,
            task_id: task_id.into(),
            context_id: context_id.into(),
        }
    }

    pub async fn submit(&self) -> Result<(), A2aError> {
        self.update_status(TaskState::Submitted, None, false).await
    }

    pub async fn start_work(&self) -> Result<(), A2aError> {
        self.update_status(TaskState::Working, None, false).await
    }

    pub async fn update_status(
        &self,
        state: TaskState,
        message: Option<Message>,
        is_final: bool,
    ) -> Result<(), A2aError> {
        let mut status = TaskStatus::new(state);
        if let Some(mut message) = message {
            message.task_id = Some(self.task_id.clone());
            message.context_id = Some(self.context_id.clone());
            status = status.with_message(message);
        }
        self.queue
            .enqueue(StreamResponse::StatusUpdate(TaskStatusUpdateEvent {
                task_id: self.task_id.clone(),
                context_id: self.context_id.clone(),
                status,
                is_final,
                metadata: None,
            }))
            .await
    }

    pub async fn add_artifact(
        &self,
        artifact_id: &str,
        parts: Vec<Part>,
        append: bool,
        last_chunk: bool,
    ) -> Result<(), A2aError> {
        self.queue
            .enqueue(StreamResponse::ArtifactUpdate(TaskArtifactUpdateEvent {
                task_id: self.task_id.clone(),
                context_id: self.context_id.clone(),
                artifact: Artifact::new(artifact_id, parts),
                append,
                last_chunk,
                metadata: None,
            }))
            .await
    }

    pub async fn complete(&self, message: Option<Message>) -> Result<(), A2aError> {
        self.update_status(TaskState::Completed, message, true).await
    }

    pub async fn requires_input(&self, message: Message) -> Result<(), A2aError> {
        self.update_status(TaskState::InputRequired, Some(message), true).await
    }

    pub async fn failed(&self, reason: impl Into<String>) -> Result<(), A2aError> {
        self.update_status(TaskState::Failed, Some(Message::agent_text(reason)), true)
            .await
    }

    pub async fn cancel(&self) -> Result<(), A2aError> {
        self.update_status(TaskState::Canceled, None, true).await
    }
}

/// Builds the agent that serves one A2A context.
pub trait AgentFactory: Send + Sync {
    fn create(&self, context_id: &str) -> agentscope_core::Result<Arc<dyn Agent>>;
}

impl<F> AgentFactory for F
where
    F: Fn(&str) -> agentscope_core::Result<Arc<dyn Agent>> + Send + Sync,
{
    fn create(&self, context_id: &str) -> agentscope_core::Result<Arc<dyn Agent>> {
        self(context_id)
    }
}

/// Serves tasks with AgentScope agents, one agent per `contextId`.
///
/// Agent events become A2A updates: text chunks are appended to the
/// `reply` artifact, tool activity is reported as `working` status
/// messages, and the final reply replaces the artifact before the task
/// completes.
///
/// Tasks of one context take turns on its agent. A task canceled while
/// waiting for its turn never reaches the agent.
pub struct AgentScopeExecutor {
    factory: Arc<dyn AgentFactory>,
    /// Most recently used last.
    sessions: Mutex<Vec<(String, Session)>>,
    running: Mutex<HashMap<String, Running>>,
    max_sessions: usize,
}

#[derive(Clone)]
struct Session {
    agent: Arc<dyn Agent>,
    /// Held by the task currently using the agent.
    turn: Arc<tokio::sync::Mutex<()>>,
}

struct Running {
    agent: Arc<dyn Agent>,
    /// Whether the task holds its session's turn.
    active: bool,
}

impl AgentScopeExecutor {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            factory,
            sessions: Mutex::new(Vec::new()),
            running: Mutex::new(HashMap::new()),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    fn session(&self, context_id: &str) -> Result<Session, A2aError> {
        let mut sessions = lock(&self.sessions);
        if let Some(pos) = sessions.iter().position(|(ctx, _)| ctx == context_id) {
            let entry = sessions.remove(pos);
            let session = entry.1.clone();
            sessions.push(entry);
            return Ok(session);
        }

        let agent = self
            .factory
            .create(context_id)
            .map_err(|e| A2aError::AgentUnavailable(e.to_string()))?;
        debug!(context_id, agent = agent.name(), "New A2A session");
        let session = Session {
            agent,
            turn: Arc::new(tokio::sync::Mutex::new(())),
        };
        sessions.push((context_id.to_string(), session.clone()));
        if sessions.len() > self.max_sessions {
            let (evicted, _) = sessions.remove(0);
            debug!(context_id = %evicted, "Evicted A2A session");
        }
        Ok(session)
    }

    /// Wait for the session's turn, then drive the agent unless the task
    /// was canceled meanwhile.
    async fn run_turn(
        &self,
        ctx: &RequestContext,
        session: &Session,
        queue: &EventQueue,
        updater: &TaskUpdater,
    ) -> Result<(), A2aError> {
        let _turn = session.turn.lock().await;
        if let Some(running) = lock(&self.running).get_mut(&ctx.task_id) {
            running.active = true;
        }
        if queue.is_closed().await {
            debug!(task_id = %ctx.task_id, "Task ended before its turn");
            return Ok(());
        }
        updater.start_work().await?;
        let msg = message_to_msg(&ctx.message, "user");
        self.drive(&session.agent, msg, updater).await
    }

    async fn drive(&self, agent: &Arc<dyn Agent>, msg: Msg, updater: &TaskUpdater) -> Result<(), A2aError> {
        let mut events = match agent.stream(vec![msg]).await {
            Ok(rx) => rx,
            Err(e) => return updater.failed(e.to_string()).await,
        };

        let status_msg = |block: ContentBlock| {
            let msg = Msg::new(agent.name(), MsgRole::Assistant, vec![block]);
            msg_to_message(&msg)
        };

        while let Some(event) = events.recv().await {
            trace!(event = event.event_type(), "Agent event");
            match event {
                AgentEvent::ReasoningChunk { text } => {
                    updater
                        .add_artifact(REPLY_ARTIFACT, vec![Part::text(text)], true, false)
                        .await?;
                }
                AgentEvent::Thinking { .. } => {}
                AgentEvent::ToolUse { id, name, input } => {
                    let message = status_msg(ContentBlock::ToolUse { id, name, input });
                    updater.update_status(TaskState::Working, Some(message), false).await?;
                }
                AgentEvent::ToolResult {
                    id,
                    name,
                    output,
                    is_error,
                } => {
                    let message = status_msg(ContentBlock::tool_result(id, name, output, is_error));
                    updater.update_status(TaskState::Working, Some(message), false).await?;
                }
                AgentEvent::Reply { msg } => {
                    updater
                        .update_status(TaskState::Working, Some(msg_to_message(&msg)), false)
                        .await?;
                }
                AgentEvent::Done { msg, iterations, .. } => {
                    let reply = msg_to_message(&msg);
                    updater.add_artifact(REPLY_ARTIFACT, reply.parts, false, true).await?;
                    info!(agent = agent.name(), iterations, "A2A task completed");
                    return updater.complete(None).await;
                }
                AgentEvent::Error { message } => {
                    warn!(agent = agent.name(), error = %message, "A2A task failed");
                    return updater.failed(message).await;
                }
            }
        }
        updater.failed("agent stream ended without a reply").await
    }
}

#[async_trait]
impl AgentExecutor for AgentScopeExecutor {
    async fn execute(&self, ctx: RequestContext, queue: Arc<EventQueue>) -> Result<(), A2aError> {
        let updater = TaskUpdater::new(Arc::clone(&queue), ctx.task_id.as_str(), ctx.context_id.as_str());
        let session = match self.session(&ctx.context_id) {
            Ok(session) => session,
            Err(e) => return updater.failed(e.to_string()).await,
        };

        lock(&self.running).insert(
            ctx.task_id.clone(),
            Running {
                agent: Arc::clone(&session.agent),
                active: false,
            },
        );
        let result = match updater.submit().await {
            Ok(()) => self.run_turn(&ctx, &session, &queue, &updater).await,
            Err(e) => Err(e),
        };
        lock(&self.running).remove(&ctx.task_id);
        result
    }

    async fn cancel(&self, ctx: RequestContext, queue: Arc<EventQueue>) -> Result<(), A2aError> {
        let updater = TaskUpdater::new(queue, ctx.task_id.as_str(), ctx.context_id.as_str());
        // Report first so the interrupted run's error lands on a closed queue
        updater.cancel().await?;
        // A task still waiting for its turn must not interrupt the one using the agent
        let agent = lock(&self.running)
            .get(&ctx.task_id)
            .filter(|running| running.active)
            .map(|running| Arc::clone(&running.agent));
        if let Some(agent) = agent {
            agent.interrupt().await;
        }
        Ok(())
    }
}
