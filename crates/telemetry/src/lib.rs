//! Execution tracing for AgentScope agents.
//!
//! [`TracingHook`] plugs into an agent's hook chain and records one
//! [`Trace`] per agent call, with spans for every model call and tool
//! execution. The [`TelemetryEngine`] stores traces and aggregates token
//! usage and failure counts.

pub mod engine;
pub mod hook;
pub mod model;

pub use engine::TelemetryEngine;
pub use hook::TracingHook;
pub use model::{ModelUsage, Span, SpanKind, TelemetrySummary, Trace};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown trace id: {0}")]
    UnknownTrace(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
