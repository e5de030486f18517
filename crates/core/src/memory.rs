//! Memory traits — what an agent remembers.
//!
//! Two kinds of memory exist:
//! - [`Memory`]: the short-term conversation history replayed to the model
//!   on every reasoning step.
//! - [`LongTermMemory`]: facts that survive across sessions, recorded and
//!   recalled by relevance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::Msg;

/// Short-term (working) memory of an agent.
#[async_trait]
pub trait Memory: Send + Sync {
    /// Append messages in order.
    async fn add(&self, msgs: Vec<Msg>) -> Result<(), MemoryError>;

    /// Snapshot of the stored messages, oldest first.
    async fn get_memory(&self) -> Result<Vec<Msg>, MemoryError>;

    /// Remove the message at `index`.
    async fn delete(&self, index: usize) -> Result<Msg, MemoryError>;

    async fn clear(&self) -> Result<(), MemoryError>;

    async fn size(&self) -> Result<usize, MemoryError>;
}

/// A recalled long-term memory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    /// Relevance score set by retrieval
    #[serde(default)]
    pub score: f32,
}

/// Long-term memory across sessions.
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// Record the content of these messages.
    async fn record(&self, msgs: &[Msg]) -> Result<(), MemoryError>;

    /// Recall the items most relevant to `query`.
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<MemoryItem>, MemoryError>;
}

/// Who drives long-term memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LongTermMemoryMode {
    /// The agent decides, through memory tools
    AgentControl,
    /// The framework retrieves before and records after every call
    #[default]
    StaticControl,
    /// Both of the above
    Both,
}

impl LongTermMemoryMode {
    pub fn is_static(self) -> bool {
        matches!(self, Self::StaticControl | Self::Both)
    }

    pub fn is_agent_controlled(self) -> bool {
        matches!(self, Self::AgentControl | Self::Both)
    }
}
