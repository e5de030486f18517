//! Task storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::A2aError;
use crate::types::Task;

/// Persists tasks between events and requests.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task: Task) -> Result<(), A2aError>;

    async fn get(&self, task_id: &str) -> Result<Option<Task>, A2aError>;

    async fn delete(&self, task_id: &str) -> Result<(), A2aError>;

    async fn all(&self) -> Result<Vec<Task>, A2aError>;
}

/// Keeps tasks in process memory.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: Task) -> Result<(), A2aError> {
        self.tasks.write().await.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<Task>, A2aError> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn delete(&self, task_id: &str) -> Result<(), A2aError> {
        self.tasks.write().await.remove(task_id);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Task>, A2aError> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }
}
