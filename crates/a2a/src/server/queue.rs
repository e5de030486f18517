//! Per-task event queue.
//!
//! Every event an executor produces is applied to the stored task and then
//! broadcast to subscribers. The queue closes itself after a final event.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, trace};

use super::store::TaskStore;
use crate::convert::merge_artifact;
use crate::error::A2aError;
use crate::types::{StreamResponse, Task};

const QUEUE_CAPACITY: usize = 256;

pub struct EventQueue {
    task_id: String,
    store: Arc<dyn TaskStore>,
    tx: broadcast::Sender<StreamResponse>,
    /// Serializes apply-then-broadcast; `true` once closed.
    gate: Mutex<bool>,
}

impl EventQueue {
    pub fn new(task_id: impl Into<String>, store: Arc<dyn TaskStore>) -> Self {
        let (tx, _) = broadcast::channel(QUEUE_CAPACITY);
        Self {
            task_id: task_id.into(),
            store,
            tx,
            gate: Mutex::new(false),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Apply `event` to the stored task and publish it.
    ///
    /// Events after the queue closed are dropped.
    pub async fn enqueue(&self, event: StreamResponse) -> Result<(), A2aError> {
        let mut closed = self.gate.lock().await;
        if *closed {
            trace!(task_id = %self.task_id, "Dropping event on closed queue");
            return Ok(());
        }

        let mut task = match self.store.get(&self.task_id).await? {
            Some(task) => task,
            None => match &event {
                StreamResponse::StatusUpdate(u) => Task::new(&u.task_id, &u.context_id),
                StreamResponse::ArtifactUpdate(u) => Task::new(&u.task_id, &u.context_id),
                _ => Task::new(&self.task_id, ""),
            },
        };
        apply(&mut task, &event);
        self.store.save(task).await?;

        let is_final = event.is_final();
        let _ = self.tx.send(event);
        if is_final {
            debug!(task_id = %self.task_id, "Event queue closed");
            *closed = true;
        }
        Ok(())
    }

    /// The current task and, unless the queue has closed, a receiver for
    /// every later event.
    pub async fn subscribe(&self) -> Result<(Task, Option<broadcast::Receiver<StreamResponse>>), A2aError> {
        let closed = self.gate.lock().await;
        let task = self
            .store
            .get(&self.task_id)
            .await?
            .unwrap_or_else(|| Task::new(&self.task_id, ""));
        let rx = (!*closed).then(|| self.tx.subscribe());
        Ok((task, rx))
    }

    pub async fn is_closed(&self) -> bool {
        *self.gate.lock().await
    }
}

fn apply(task: &mut Task, event: &StreamResponse) {
    match event {
        StreamResponse::Task(t) => *task = t.clone(),
        StreamResponse::StatusUpdate(update) => {
            if let Some(previous) = task.status.message.take() {
                task.history.push(previous);
            }
            task.status = update.status.clone();
        }
        StreamResponse::ArtifactUpdate(update) => merge_artifact(&mut task.artifacts, update),
        StreamResponse::Message(message) => task.history.push(message.clone()),
    }
}
