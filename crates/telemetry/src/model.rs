//! Data model for execution traces, spans and usage summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// One agent call, from input to reply.
    AgentCall,
    /// A chat model call.
    ModelCall,
    /// A tool execution.
    ToolCall,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AgentCall => write!(f, "agent_call"),
            Self::ModelCall => write!(f, "model_call"),
            Self::ToolCall => write!(f, "tool_call"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    /// Parent span id (None for root spans).
    pub parent_id: Option<String>,
    pub kind: SpanKind,
    /// Agent name, model name or tool name.
    pub label: String,
    pub started_at: DateTime<Utc>,
    /// None while still running.
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    /// Input tokens consumed (model calls).
    pub input_tokens: Option<u32>,
    /// Output tokens produced (model calls).
    pub output_tokens: Option<u32>,
    pub success: Option<bool>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            kind,
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            input_tokens: None,
            output_tokens: None,
            success: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Mark the span as ended with the given success status.
    pub fn end(&mut self, success: bool) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }

    pub fn record_tokens(&mut self, input: u32, output: u32) {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
    }

    /// Total tokens (input + output), or 0 if not recorded.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }

    pub fn is_failure(&self) -> bool {
        self.success == Some(false)
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// All spans of one agent call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    /// Name of the agent that was called.
    pub agent: String,
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Trace {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent: agent.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    /// Mark the trace as complete.
    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        self.ended_at.is_some()
    }

    /// The agent-call span, once recorded.
    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.kind == SpanKind::AgentCall)
    }

    /// Total tokens across all spans.
    pub fn total_tokens(&self) -> u32 {
        self.spans.iter().map(|s| s.total_tokens()).sum()
    }

    pub fn count(&self, kind: SpanKind) -> usize {
        self.spans.iter().filter(|s| s.kind == kind).count()
    }

    pub fn failed(&self) -> bool {
        self.root().is_some_and(Span::is_failure)
    }
}

// ── Aggregated views ──────────────────────────────────────────────────────

/// Totals across every stored trace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySummary {
    pub traces: u64,
    pub agent_calls: u64,
    pub model_calls: u64,
    pub tool_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Failed agent calls.
    pub failed_calls: u64,
    /// Tool calls that returned an error.
    pub failed_tool_calls: u64,
    /// Usage per model, sorted by model name.
    pub by_model: Vec<ModelUsage>,
}

impl TelemetrySummary {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Usage of a single model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelUsage {
    pub model: String,
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_lifecycle() {
        let mut span = Span::new(SpanKind::ModelCall, "qwen-max");
        assert!(span.ended_at.is_none());
        assert_eq!(span.total_tokens(), 0);

        span.record_tokens(100, 50);
        assert_eq!(span.total_tokens(), 150);

        span.end(true);
        assert!(span.ended_at.is_some());
        assert!(span.success.unwrap());
        assert!(span.duration_ms.is_some());
        assert!(!span.is_failure());
    }

    #[test]
    fn span_with_parent() {
        let parent = Span::new(SpanKind::AgentCall, "Friday");
        let child = Span::new(SpanKind::ToolCall, "view_text_file").with_parent(&parent.id);
        assert_eq!(child.parent_id, Some(parent.id));
    }

    #[test]
    fn trace_aggregation() {
        let mut trace = Trace::new("Friday");

        let mut s1 = Span::new(SpanKind::ModelCall, "qwen-max");
        s1.record_tokens(100, 50);
        s1.end(true);
        trace.add_span(s1);

        let mut s2 = Span::new(SpanKind::ToolCall, "execute_shell_command");
        s2.end(false);
        trace.add_span(s2);

        let mut root = Span::new(SpanKind::AgentCall, "Friday");
        root.end(true);
        trace.add_span(root);
        trace.end();

        assert_eq!(trace.total_tokens(), 150);
        assert_eq!(trace.count(SpanKind::ModelCall), 1);
        assert_eq!(trace.count(SpanKind::ToolCall), 1);
        assert_eq!(trace.root().unwrap().label, "Friday");
        assert!(!trace.failed());
        assert!(trace.is_complete());
    }

    #[test]
    fn span_kind_display() {
        assert_eq!(SpanKind::AgentCall.to_string(), "agent_call");
        assert_eq!(SpanKind::ModelCall.to_string(), "model_call");
        assert_eq!(SpanKind::ToolCall.to_string(), "tool_call");
    }

    #[test]
    fn span_serializes_kind_in_snake_case() {
        let span = Span::new(SpanKind::ToolCall, "shell");
        let json = serde_json::to_value(&span).unwrap();
        assert_eq!(json["kind"], "tool_call");
        assert_eq!(json["label"], "shell");
    }
}
