//! Error types for the AgentScope domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] unifies them.

use thiserror::Error;

/// The top-level error type for all AgentScope operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Memory / knowledge errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Agent errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors raised by chat and embedding model clients.
///
/// HTTP failures are classified by status code through
/// [`ModelError::from_status`].
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Bad request (400): {0}")]
    BadRequest(String),

    #[error("Authentication failed (401): {0}")]
    Authentication(String),

    #[error("Permission denied (403): {0}")]
    PermissionDenied(String),

    #[error("Not found (404): {0}")]
    NotFound(String),

    #[error("Unprocessable entity (422): {0}")]
    UnprocessableEntity(String),

    #[error("Rate limited (429), retry after {retry_after_secs}s: {message}")]
    RateLimited { retry_after_secs: u64, message: String },

    #[error("Provider internal error ({status_code}): {message}")]
    InternalServer { status_code: u16, message: String },

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ModelError {
    /// Map a non-success HTTP status and its body to the matching error.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            400 => Self::BadRequest(message),
            401 => Self::Authentication(message),
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            422 => Self::UnprocessableEntity(message),
            429 => Self::RateLimited {
                retry_after_secs: 5,
                message,
            },
            500..=599 => Self::InternalServer {
                status_code,
                message,
            },
            _ => Self::Api {
                status_code,
                message,
            },
        }
    }

    /// The HTTP status this error came from, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::Authentication(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::UnprocessableEntity(_) => Some(422),
            Self::RateLimited { .. } => Some(429),
            Self::InternalServer { status_code, .. } | Self::Api { status_code, .. } => {
                Some(*status_code)
            }
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::InternalServer { .. }
                | Self::Network(_)
                | Self::StreamInterrupted(_)
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Index out of range: {index} (size {size})")]
    IndexOutOfRange { index: usize, size: usize },
}

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Agent '{0}' was interrupted")]
    Interrupted(String),

    #[error("Agent '{agent}' is misconfigured: {reason}")]
    Misconfigured { agent: String, reason: String },

    #[error("Remote agent failed: {0}")]
    Remote(String),

    #[error("Structured output invalid: {0}")]
    StructuredOutput(String),

    #[error("Input unavailable: {0}")]
    InputUnavailable(String),

    #[error("Agent '{0}' not found")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_variants() {
        assert!(matches!(ModelError::from_status(400, "x"), ModelError::BadRequest(_)));
        assert!(matches!(ModelError::from_status(401, "x"), ModelError::Authentication(_)));
        assert!(matches!(ModelError::from_status(403, "x"), ModelError::PermissionDenied(_)));
        assert!(matches!(ModelError::from_status(404, "x"), ModelError::NotFound(_)));
        assert!(matches!(
            ModelError::from_status(422, "x"),
            ModelError::UnprocessableEntity(_)
        ));
        assert!(matches!(ModelError::from_status(429, "x"), ModelError::RateLimited { .. }));
        assert!(matches!(
            ModelError::from_status(503, "x"),
            ModelError::InternalServer { status_code: 503, .. }
        ));
        assert!(matches!(
            ModelError::from_status(418, "x"),
            ModelError::Api { status_code: 418, .. }
        ));
    }

    #[test]
    fn status_code_roundtrips() {
        for code in [400u16, 401, 403, 404, 422, 429, 500, 502, 418] {
            assert_eq!(ModelError::from_status(code, "body").status_code(), Some(code));
        }
        assert_eq!(ModelError::Network("down".into()).status_code(), None);
    }

    #[test]
    fn retryable_classification() {
        assert!(ModelError::from_status(429, "slow down").is_retryable());
        assert!(ModelError::from_status(500, "oops").is_retryable());
        assert!(!ModelError::from_status(401, "bad key").is_retryable());
    }

    #[test]
    fn model_error_displays_body() {
        let err = Error::Model(ModelError::from_status(401, "Invalid API key"));
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::PermissionDenied {
            tool_name: "execute_shell_command".into(),
            reason: "command not in allowlist".into(),
        });
        assert!(err.to_string().contains("execute_shell_command"));
        assert!(err.to_string().contains("allowlist"));
    }
}
