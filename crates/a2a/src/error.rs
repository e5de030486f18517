//! A2A error type.

use agentscope_core::error::AgentError;

use crate::types::{JsonRpcError, TaskState};

#[derive(Debug, thiserror::Error)]
pub enum A2aError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task {task_id} ended as {state}: {message}")]
    TaskFailed {
        task_id: String,
        state: TaskState,
        message: String,
    },

    #[error("Agent card unavailable: {0}")]
    CardUnavailable(String),

    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("Task store error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for A2aError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<JsonRpcError> for A2aError {
    fn from(e: JsonRpcError) -> Self {
        Self::Rpc {
            code: e.code,
            message: e.message,
            data: e.data,
        }
    }
}

impl From<A2aError> for agentscope_core::Error {
    fn from(e: A2aError) -> Self {
        AgentError::Remote(e.to_string()).into()
    }
}
