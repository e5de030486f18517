//! Thread-safe telemetry engine — stores traces and keeps running usage
//! totals across agent calls.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::TelemetryError;
use crate::model::*;

/// Completed traces kept by [`TelemetryEngine::default`].
pub const DEFAULT_MAX_TRACES: usize = 1_000;

/// The core telemetry engine.
///
/// Traces are bounded: when `max_traces` is reached the oldest completed
/// traces are dropped. Totals are lifetime values and survive pruning.
pub struct TelemetryEngine {
    max_traces: usize,
    /// All stored traces (most recent last).
    traces: RwLock<Vec<Trace>>,
    totals: RwLock<RunningTotals>,
}

#[derive(Debug, Default)]
struct RunningTotals {
    traces: u64,
    agent_calls: u64,
    model_calls: u64,
    tool_calls: u64,
    input_tokens: u64,
    output_tokens: u64,
    failed_calls: u64,
    failed_tool_calls: u64,
    /// model → (calls, input tokens, output tokens)
    by_model: HashMap<String, (u64, u64, u64)>,
}

impl TelemetryEngine {
    pub fn new(max_traces: usize) -> Self {
        Self {
            max_traces: max_traces.max(1),
            traces: RwLock::new(Vec::new()),
            totals: RwLock::new(RunningTotals::default()),
        }
    }

    pub fn from_config(config: &agentscope_config::TelemetryConfig) -> Self {
        Self::new(config.max_traces)
    }

    // ── Trace management ──────────────────────────────────────────────

    /// Start a new trace for an agent call. Returns the trace id.
    pub fn start_trace(&self, agent: impl Into<String>) -> String {
        let trace = Trace::new(agent);
        let id = trace.id.clone();
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);

        if traces.len() >= self.max_traces {
            // Remove oldest completed traces first
            let drain_count = (self.max_traces / 10).max(1);
            let mut removed = 0;
            traces.retain(|t| {
                if removed >= drain_count || !t.is_complete() {
                    return true;
                }
                removed += 1;
                false
            });
        }

        traces.push(trace);
        self.totals.write().unwrap_or_else(PoisonError::into_inner).traces += 1;
        id
    }

    pub fn end_trace(&self, trace_id: &str) {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(trace) = traces.iter_mut().find(|t| t.id == trace_id) {
            trace.end();
        }
    }

    /// Record a finished span in a trace and update running totals.
    pub fn record_span(&self, trace_id: &str, span: Span) -> Result<(), TelemetryError> {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        let trace = traces
            .iter_mut()
            .find(|t| t.id == trace_id)
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))?;

        {
            let mut totals = self.totals.write().unwrap_or_else(PoisonError::into_inner);
            let input = span.input_tokens.unwrap_or(0) as u64;
            let output = span.output_tokens.unwrap_or(0) as u64;
            totals.input_tokens += input;
            totals.output_tokens += output;

            match span.kind {
                SpanKind::AgentCall => {
                    totals.agent_calls += 1;
                    if span.is_failure() {
                        totals.failed_calls += 1;
                    }
                }
                SpanKind::ModelCall => {
                    totals.model_calls += 1;
                    let entry = totals.by_model.entry(span.label.clone()).or_default();
                    entry.0 += 1;
                    entry.1 += input;
                    entry.2 += output;
                }
                SpanKind::ToolCall => {
                    totals.tool_calls += 1;
                    if span.is_failure() {
                        totals.failed_tool_calls += 1;
                    }
                }
            }
        }

        trace.add_span(span);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.iter().find(|t| t.id == trace_id).cloned()
    }

    /// List recent traces (most recent first).
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.iter().rev().take(limit).cloned().collect()
    }

    pub fn traces_for_agent(&self, agent: &str) -> Vec<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.iter().filter(|t| t.agent == agent).cloned().collect()
    }

    /// Number of traces currently stored.
    pub fn trace_count(&self) -> usize {
        self.traces.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Lifetime totals.
    pub fn summary(&self) -> TelemetrySummary {
        let totals = self.totals.read().unwrap_or_else(PoisonError::into_inner);
        let mut by_model: Vec<ModelUsage> = totals
            .by_model
            .iter()
            .map(|(model, (calls, input, output))| ModelUsage {
                model: model.clone(),
                calls: *calls,
                input_tokens: *input,
                output_tokens: *output,
            })
            .collect();
        by_model.sort_by(|a, b| a.model.cmp(&b.model));

        TelemetrySummary {
            traces: totals.traces,
            agent_calls: totals.agent_calls,
            model_calls: totals.model_calls,
            tool_calls: totals.tool_calls,
            input_tokens: totals.input_tokens,
            output_tokens: totals.output_tokens,
            failed_calls: totals.failed_calls,
            failed_tool_calls: totals.failed_tool_calls,
            by_model,
        }
    }

    /// A stored trace as pretty-printed JSON.
    pub fn export_trace(&self, trace_id: &str) -> Result<String, TelemetryError> {
        let trace = self
            .get_trace(trace_id)
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))?;
        Ok(serde_json::to_string_pretty(&trace)?)
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRACES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_span(model: &str, input: u32, output: u32) -> Span {
        let mut span = Span::new(SpanKind::ModelCall, model);
        span.record_tokens(input, output);
        span.end(true);
        span
    }

    #[test]
    fn start_and_end_trace() {
        let engine = TelemetryEngine::default();
        let trace_id = engine.start_trace("Friday");
        assert_eq!(engine.trace_count(), 1);

        engine.end_trace(&trace_id);
        let trace = engine.get_trace(&trace_id).unwrap();
        assert!(trace.is_complete());
        assert_eq!(trace.agent, "Friday");
    }

    #[test]
    fn record_span_updates_summary() {
        let engine = TelemetryEngine::default();
        let trace_id = engine.start_trace("Friday");
        engine.record_span(&trace_id, model_span("qwen-max", 1000, 500)).unwrap();
        engine.record_span(&trace_id, model_span("qwen-max", 200, 100)).unwrap();
        engine.record_span(&trace_id, model_span("gpt-4o", 10, 5)).unwrap();

        let mut tool = Span::new(SpanKind::ToolCall, "execute_shell_command");
        tool.end(false);
        engine.record_span(&trace_id, tool).unwrap();

        let mut root = Span::new(SpanKind::AgentCall, "Friday");
        root.end(true);
        engine.record_span(&trace_id, root).unwrap();

        let summary = engine.summary();
        assert_eq!(summary.traces, 1);
        assert_eq!(summary.agent_calls, 1);
        assert_eq!(summary.model_calls, 3);
        assert_eq!(summary.tool_calls, 1);
        assert_eq!(summary.failed_tool_calls, 1);
        assert_eq!(summary.failed_calls, 0);
        assert_eq!(summary.total_tokens(), 1815);
        assert_eq!(
            summary.by_model,
            vec![
                ModelUsage {
                    model: "gpt-4o".into(),
                    calls: 1,
                    input_tokens: 10,
                    output_tokens: 5
                },
                ModelUsage {
                    model: "qwen-max".into(),
                    calls: 2,
                    input_tokens: 1200,
                    output_tokens: 600
                },
            ]
        );
    }

    #[test]
    fn unknown_trace_is_an_error() {
        let engine = TelemetryEngine::default();
        let err = engine.record_span("nope", model_span("m", 1, 1)).unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownTrace(_)));
        assert_eq!(engine.summary(), TelemetrySummary::default());
    }

    #[test]
    fn recent_traces_newest_first() {
        let engine = TelemetryEngine::default();
        engine.start_trace("a");
        engine.start_trace("b");
        engine.start_trace("a");

        let recent = engine.recent_traces(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].agent, "a");
        assert_eq!(recent[1].agent, "b");
        assert_eq!(engine.traces_for_agent("a").len(), 2);
    }

    #[test]
    fn prunes_oldest_completed_traces() {
        let engine = TelemetryEngine::new(3);
        let running = engine.start_trace("running");
        let done = engine.start_trace("done");
        engine.end_trace(&done);
        engine.start_trace("third");

        engine.start_trace("fourth");
        assert_eq!(engine.trace_count(), 3);
        assert!(engine.get_trace(&running).is_some());
        assert!(engine.get_trace(&done).is_none());
        // totals outlive pruning
        assert_eq!(engine.summary().traces, 4);
    }

    #[test]
    fn export_trace_as_json() {
        let engine = TelemetryEngine::default();
        let trace_id = engine.start_trace("Friday");
        engine.record_span(&trace_id, model_span("qwen-max", 1, 2)).unwrap();
        let json = engine.export_trace(&trace_id).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["spans"][0]["kind"], "model_call");
    }
}
