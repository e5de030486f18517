//! JSON-RPC request handling for the A2A server.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, info, warn};

use super::executor::{AgentExecutor, RequestContext, TaskUpdater};
use super::queue::EventQueue;
use super::store::TaskStore;
use crate::error::A2aError;
use crate::types::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, Message, MessageSendParams, SendMessageResult, StreamResponse,
    Task, TaskIdParams, TaskQueryParams, methods,
};

const STREAM_BUFFER: usize = 64;

type RpcResult<T> = Result<T, JsonRpcError>;

fn params<P: DeserializeOwned>(value: serde_json::Value) -> RpcResult<P> {
    serde_json::from_value(value).map_err(JsonRpcError::invalid_params)
}

fn internal(e: A2aError) -> JsonRpcError {
    JsonRpcError::internal(e)
}

/// Whether a blocking `message/send` can return after this event.
fn settles(event: &StreamResponse) -> bool {
    match event {
        StreamResponse::StatusUpdate(update) => update.is_final || update.status.state.is_interrupted(),
        other => other.is_final(),
    }
}

/// Dispatches A2A methods to an [`AgentExecutor`], tracking tasks in a
/// [`TaskStore`].
pub struct RequestHandler {
    executor: Arc<dyn AgentExecutor>,
    store: Arc<dyn TaskStore>,
    queues: Arc<Mutex<HashMap<String, Arc<EventQueue>>>>,
}

impl RequestHandler {
    pub fn new(executor: Arc<dyn AgentExecutor>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            executor,
            store,
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Handle a non-streaming request.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        let result = match request.method.as_str() {
            methods::SEND_MESSAGE => match params(request.params) {
                Ok(p) => self.on_message_send(p).await.and_then(to_value),
                Err(e) => Err(e),
            },
            methods::GET_TASK => match params(request.params) {
                Ok(p) => self.on_get_task(p).await.and_then(to_value),
                Err(e) => Err(e),
            },
            methods::CANCEL_TASK => match params(request.params) {
                Ok(p) => self.on_cancel_task(p).await.and_then(to_value),
                Err(e) => Err(e),
            },
            methods::SEND_STREAMING_MESSAGE | methods::RESUBSCRIBE => Err(JsonRpcError::unsupported(format!(
                "{} needs a streaming transport",
                request.method
            ))),
            other => Err(JsonRpcError::method_not_found(other)),
        };
        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::failure(id, error),
        }
    }

    /// Handle `message/stream` or `tasks/resubscribe`.
    pub async fn handle_stream(&self, request: JsonRpcRequest) -> RpcResult<mpsc::Receiver<StreamResponse>> {
        match request.method.as_str() {
            methods::SEND_STREAMING_MESSAGE => self.on_message_stream(params(request.params)?).await,
            methods::RESUBSCRIBE => self.on_resubscribe(params(request.params)?).await,
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    pub async fn on_message_send(&self, params: MessageSendParams) -> RpcResult<SendMessageResult> {
        let blocking = params.is_blocking();
        let history = params.history_length();
        let (snapshot, rx) = self.start(params.message).await?;
        let task_id = snapshot.id.clone();

        if !blocking {
            return Ok(SendMessageResult::Task(snapshot.with_history_limit(history)));
        }
        if let Some(mut rx) = rx {
            loop {
                match rx.recv().await {
                    Ok(event) if settles(&event) => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(task_id = %task_id, skipped = n, "Blocking send lagged behind events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        let task = self.store.get(&task_id).await.map_err(internal)?.unwrap_or(snapshot);
        Ok(SendMessageResult::Task(task.with_history_limit(history)))
    }

    pub async fn on_message_stream(&self, params: MessageSendParams) -> RpcResult<mpsc::Receiver<StreamResponse>> {
        let (snapshot, rx) = self.start(params.message).await?;
        Ok(forward(snapshot, rx))
    }

    pub async fn on_get_task(&self, params: TaskQueryParams) -> RpcResult<Task> {
        let task = self.load(&params.id).await?;
        Ok(task.with_history_limit(params.history_length))
    }

    pub async fn on_cancel_task(&self, params: TaskIdParams) -> RpcResult<Task> {
        let task = self.load(&params.id).await?;
        if task.status.state.is_terminal() {
            return Err(JsonRpcError::task_not_cancelable(&task.id, task.status.state));
        }

        let (queue, fresh) = self.queue_for(&task).await;
        let ctx = RequestContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            message: task
                .history
                .last()
                .cloned()
                .unwrap_or_else(|| Message::user_text("")),
            task: Some(task.clone()),
        };
        self.executor.cancel(ctx, Arc::clone(&queue)).await.map_err(internal)?;
        if fresh {
            self.queues.lock().await.remove(&task.id);
        }
        info!(task_id = %task.id, "A2A task canceled");
        self.load(&task.id).await
    }

    pub async fn on_resubscribe(&self, params: TaskIdParams) -> RpcResult<mpsc::Receiver<StreamResponse>> {
        let task = self.load(&params.id).await?;
        let queue = self.queues.lock().await.get(&task.id).cloned();
        match queue {
            Some(queue) => {
                let (snapshot, rx) = queue.subscribe().await.map_err(internal)?;
                Ok(forward(snapshot, rx))
            }
            None => Ok(forward(task, None)),
        }
    }

    async fn load(&self, task_id: &str) -> RpcResult<Task> {
        self.store
            .get(task_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| JsonRpcError::task_not_found(task_id))
    }

    /// The live queue of `task`, or a fresh one (flagged `true`) when none
    /// is running.
    async fn queue_for(&self, task: &Task) -> (Arc<EventQueue>, bool) {
        let mut queues = self.queues.lock().await;
        if let Some(queue) = queues.get(&task.id) {
            return (Arc::clone(queue), false);
        }
        let queue = Arc::new(EventQueue::new(task.id.as_str(), Arc::clone(&self.store)));
        queues.insert(task.id.clone(), Arc::clone(&queue));
        (queue, true)
    }

    /// Create or continue a task for `message` and start the executor on it.
    ///
    /// Subscribes before the executor runs so no event is missed.
    async fn start(
        &self,
        mut message: Message,
    ) -> RpcResult<(Task, Option<broadcast::Receiver<StreamResponse>>)> {
        let mut queues = self.queues.lock().await;

        let (mut task, previous) = match message.task_id.clone() {
            Some(task_id) => {
                let existing = self.load(&task_id).await?;
                let state = existing.status.state;
                if state.is_terminal() {
                    return Err(JsonRpcError::invalid_params(format!(
                        "task {task_id} is already {state}"
                    )));
                }
                if let Some(queue) = queues.get(&task_id)
                    && !queue.is_closed().await
                {
                    return Err(JsonRpcError::invalid_params(format!("task {task_id} is still running")));
                }
                (existing.clone(), Some(existing))
            }
            None => {
                let context_id = message
                    .context_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                (Task::new(uuid::Uuid::new_v4().to_string(), context_id), None)
            }
        };

        message.task_id = Some(task.id.clone());
        message.context_id = Some(task.context_id.clone());
        task.history.push(message.clone());
        self.store.save(task.clone()).await.map_err(internal)?;

        let queue = Arc::new(EventQueue::new(task.id.as_str(), Arc::clone(&self.store)));
        queues.insert(task.id.clone(), Arc::clone(&queue));
        drop(queues);

        let (snapshot, rx) = queue.subscribe().await.map_err(internal)?;
        debug!(task_id = %task.id, context_id = %task.context_id, continued = previous.is_some(), "Starting A2A task");

        let ctx = RequestContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            message,
            task: previous,
        };
        let executor = Arc::clone(&self.executor);
        let queues = Arc::clone(&self.queues);
        tokio::spawn(async move {
            let task_id = ctx.task_id.clone();
            let context_id = ctx.context_id.clone();
            if let Err(e) = executor.execute(ctx, Arc::clone(&queue)).await {
                warn!(task_id = %task_id, error = %e, "A2A executor failed");
            }
            if !queue.is_closed().await {
                let updater = TaskUpdater::new(Arc::clone(&queue), task_id.as_str(), context_id.as_str());
                if let Err(e) = updater.failed("executor stopped before the task finished").await {
                    warn!(task_id = %task_id, error = %e, "Could not record task failure");
                }
            }
            let mut queues = queues.lock().await;
            if queues.get(&task_id).is_some_and(|q| Arc::ptr_eq(q, &queue)) {
                queues.remove(&task_id);
            }
        });

        Ok((snapshot, rx))
    }
}

fn to_value<T: serde::Serialize>(value: T) -> RpcResult<serde_json::Value> {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}

/// Stream the snapshot, then live events until a final one.
fn forward(snapshot: Task, rx: Option<broadcast::Receiver<StreamResponse>>) -> mpsc::Receiver<StreamResponse> {
    let (tx, out) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        let done = snapshot.status.state.is_terminal();
        if tx.send(StreamResponse::Task(snapshot)).await.is_err() || done {
            return;
        }
        let Some(mut rx) = rx else {
            return;
        };
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let is_final = event.is_final();
                    if tx.send(event).await.is_err() || is_final {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "A2A stream subscriber lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::executor::AgentScopeExecutor;
    use crate::server::store::InMemoryTaskStore;
    use crate::types::{MessageSendConfiguration, TaskState, codes};
    use agentscope_agent::ReActAgent;
    use agentscope_agent::test_helpers::ScriptedModel;
    use agentscope_core::Agent;
    use std::time::Duration;

    fn handler_with(delay: Option<Duration>) -> RequestHandler {
        let factory = move |_ctx: &str| -> agentscope_core::Result<Arc<dyn Agent>> {
            let mut model = ScriptedModel::single_text("done");
            if let Some(delay) = delay {
                model = model.with_delay(delay);
            }
            let agent = ReActAgent::builder().name("Friday").model(Arc::new(model)).build()?;
            Ok(Arc::new(agent))
        };
        let executor = Arc::new(AgentScopeExecutor::new(Arc::new(factory)));
        RequestHandler::new(executor, Arc::new(InMemoryTaskStore::new()))
    }

    fn send(text: &str) -> MessageSendParams {
        MessageSendParams::new(Message::user_text(text))
    }

    fn task_of(result: SendMessageResult) -> Task {
        match result {
            SendMessageResult::Task(task) => task,
            SendMessageResult::Message(m) => panic!("expected a task, got message {m:?}"),
        }
    }

    #[tokio::test]
    async fn blocking_send_returns_completed_task() {
        let handler = handler_with(None);
        let task = task_of(handler.on_message_send(send("hi")).await.unwrap());
        assert_eq!(task.status.state, TaskState::Completed);
        assert_eq!(task.artifacts[0].parts[0].as_text(), Some("done"));
        assert_eq!(task.history[0].text(), "hi");
    }

    #[tokio::test]
    async fn non_blocking_send_returns_immediately() {
        let handler = handler_with(Some(Duration::from_millis(200)));
        let mut params = send("hi");
        params.configuration = Some(MessageSendConfiguration {
            blocking: Some(false),
            ..Default::default()
        });
        let task = task_of(handler.on_message_send(params).await.unwrap());
        assert_eq!(task.status.state, TaskState::Submitted);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let done = handler
            .on_get_task(TaskQueryParams {
                id: task.id,
                history_length: Some(0),
                metadata: None,
            })
            .await
            .unwrap();
        assert_eq!(done.status.state, TaskState::Completed);
        assert!(done.history.is_empty());
    }

    #[tokio::test]
    async fn stream_starts_with_snapshot_and_ends_final() {
        let handler = handler_with(None);
        let mut rx = handler.on_message_stream(send("hi")).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StreamResponse::Task(ref t) if t.status.state == TaskState::Submitted));

        let mut last = first;
        while let Some(item) = rx.recv().await {
            last = item;
        }
        assert!(last.is_final());
        assert!(matches!(last, StreamResponse::StatusUpdate(ref u) if u.status.state == TaskState::Completed));
    }

    #[tokio::test]
    async fn unknown_task_errors() {
        let handler = handler_with(None);
        let err = handler
            .on_get_task(TaskQueryParams {
                id: "missing".into(),
                history_length: None,
                metadata: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::TASK_NOT_FOUND);

        let mut message = Message::user_text("again");
        message.task_id = Some("missing".into());
        let err = handler.on_message_send(MessageSendParams::new(message)).await.unwrap_err();
        assert_eq!(err.code, codes::TASK_NOT_FOUND);
    }

    #[tokio::test]
    async fn finished_tasks_reject_follow_ups_and_cancel() {
        let handler = handler_with(None);
        let task = task_of(handler.on_message_send(send("hi")).await.unwrap());

        let err = handler
            .on_cancel_task(TaskIdParams {
                id: task.id.clone(),
                metadata: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::TASK_NOT_CANCELABLE);

        let mut message = Message::user_text("more");
        message.task_id = Some(task.id);
        let err = handler.on_message_send(MessageSendParams::new(message)).await.unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn cancel_running_task() {
        let handler = handler_with(Some(Duration::from_secs(5)));
        let mut params = send("slow");
        params.configuration = Some(MessageSendConfiguration {
            blocking: Some(false),
            ..Default::default()
        });
        let task = task_of(handler.on_message_send(params).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let canceled = handler
            .on_cancel_task(TaskIdParams {
                id: task.id,
                metadata: None,
            })
            .await
            .unwrap();
        assert_eq!(canceled.status.state, TaskState::Canceled);
    }

    #[tokio::test]
    async fn context_id_is_kept_for_new_tasks() {
        let handler = handler_with(None);
        let mut message = Message::user_text("hi");
        message.context_id = Some("ctx-1".into());
        let task = task_of(handler.on_message_send(MessageSendParams::new(message)).await.unwrap());
        assert_eq!(task.context_id, "ctx-1");
    }

    #[tokio::test]
    async fn handle_dispatches_and_reports_unknown_methods() {
        let handler = handler_with(None);
        let response = handler
            .handle(JsonRpcRequest::new("tasks/unknown", serde_json::json!({})))
            .await;
        assert_eq!(response.error.unwrap().code, codes::METHOD_NOT_FOUND);

        let response = handler
            .handle(JsonRpcRequest::new(methods::GET_TASK, serde_json::json!({"nope": 1})))
            .await;
        assert_eq!(response.error.unwrap().code, codes::INVALID_PARAMS);

        let response = handler
            .handle(JsonRpcRequest::new(
                methods::SEND_MESSAGE,
                serde_json::to_value(send("hi")).unwrap(),
            ))
            .await;
        let task: Task = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(task.status.state, TaskState::Completed);
    }
}
