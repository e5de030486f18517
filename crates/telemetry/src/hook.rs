//! Agent hook that turns lifecycle events into trace spans.
//!
//! Span layout per agent call:
//!
//! ```text
//! agent_call (PreCall → PostCall | Error)
//! ├── model_call (PreReasoning → PostReasoning)
//! ├── tool_call  (PreActing → PostActing)
//! └── ...
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use agentscope_core::hook::{Hook, HookEvent};
use agentscope_core::model::Usage;
use agentscope_core::ContentBlock;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::TelemetryEngine;
use crate::model::{Span, SpanKind};

/// Spans still open for one agent.
struct OpenCall {
    trace_id: String,
    root: Span,
    model: Option<Span>,
    /// Keyed by tool-use id.
    tools: HashMap<String, Span>,
}

/// Records a trace per agent call into a [`TelemetryEngine`].
///
/// One hook may be shared by several agents; open calls are tracked per
/// agent name.
pub struct TracingHook {
    engine: Arc<TelemetryEngine>,
    open: Mutex<HashMap<String, OpenCall>>,
}

impl TracingHook {
    pub fn new(engine: Arc<TelemetryEngine>) -> Self {
        Self {
            engine,
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<TelemetryEngine> {
        &self.engine
    }

    fn record(&self, trace_id: &str, span: Span) {
        debug!(
            kind = %span.kind,
            label = %span.label,
            duration_ms = span.duration_ms.unwrap_or(0),
            success = span.success.unwrap_or(false),
            "Span finished"
        );
        if let Err(e) = self.engine.record_span(trace_id, span) {
            warn!(error = %e, "Dropping span");
        }
    }

    /// Close every open span of `call` and the trace itself.
    fn finish(&self, mut call: OpenCall, success: bool, error: Option<&str>) {
        if let Some(mut model) = call.model.take() {
            model.end(false);
            self.record(&call.trace_id, model);
        }
        for (_, mut tool) in call.tools.drain() {
            tool.end(false);
            self.record(&call.trace_id, tool);
        }
        if let Some(error) = error {
            call.root
                .metadata
                .insert("error".into(), serde_json::Value::String(error.to_string()));
        }
        call.root.end(success);
        let agent = call.root.label.clone();
        let duration_ms = call.root.duration_ms.unwrap_or(0);
        self.record(&call.trace_id, call.root);
        self.engine.end_trace(&call.trace_id);

        let tokens = self
            .engine
            .get_trace(&call.trace_id)
            .map(|t| t.total_tokens())
            .unwrap_or(0);
        info!(agent = %agent, trace_id = %call.trace_id, duration_ms, tokens, success, "Agent call traced");
    }
}

#[async_trait]
impl Hook for TracingHook {
    async fn on_event(&self, event: &mut HookEvent) {
        let mut open = self.open.lock().await;
        match event {
            HookEvent::PreCall { agent, input } => {
                let trace_id = self.engine.start_trace(agent.as_str());
                let root = Span::new(SpanKind::AgentCall, agent.as_str())
                    .with_metadata("inputs", serde_json::Value::from(input.len()));
                if let Some(stale) = open.insert(
                    agent.clone(),
                    OpenCall {
                        trace_id,
                        root,
                        model: None,
                        tools: HashMap::new(),
                    },
                ) {
                    warn!(agent = %agent, "Previous call never finished");
                    self.finish(stale, false, Some("superseded by a new call"));
                }
            }
            HookEvent::PreReasoning { agent, request } => {
                if let Some(call) = open.get_mut(agent.as_str()) {
                    let span = Span::new(SpanKind::ModelCall, request.model.as_str())
                        .with_parent(&call.root.id)
                        .with_metadata("messages", serde_json::Value::from(request.messages.len()))
                        .with_metadata("tools", serde_json::Value::from(request.tools.len()));
                    call.model = Some(span);
                }
            }
            HookEvent::PostReasoning { agent, msg } => {
                if let Some(call) = open.get_mut(agent.as_str())
                    && let Some(mut span) = call.model.take()
                {
                    if let Some(usage) = msg
                        .metadata
                        .get("usage")
                        .and_then(|v| serde_json::from_value::<Usage>(v.clone()).ok())
                    {
                        span.record_tokens(usage.input_tokens, usage.output_tokens);
                    }
                    span.end(true);
                    let trace_id = call.trace_id.clone();
                    self.record(&trace_id, span);
                }
            }
            HookEvent::PreActing { agent, tool_use } => {
                if let Some(call) = open.get_mut(agent.as_str())
                    && let ContentBlock::ToolUse { id, name, .. } = tool_use
                {
                    let span = Span::new(SpanKind::ToolCall, name.as_str()).with_parent(&call.root.id);
                    call.tools.insert(id.clone(), span);
                }
            }
            HookEvent::PostActing { agent, result, .. } => {
                if let Some(call) = open.get_mut(agent.as_str())
                    && let ContentBlock::ToolResult { id, is_error, .. } = result
                    && let Some(mut span) = call.tools.remove(id.as_str())
                {
                    span.end(!*is_error);
                    let trace_id = call.trace_id.clone();
                    self.record(&trace_id, span);
                }
            }
            HookEvent::PostCall { agent, .. } => {
                if let Some(call) = open.remove(agent.as_str()) {
                    self.finish(call, true, None);
                }
            }
            HookEvent::Error { agent, error } => {
                if let Some(call) = open.remove(agent.as_str()) {
                    self.finish(call, false, Some(error.as_str()));
                }
            }
            HookEvent::ReasoningChunk { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TelemetrySummary;
    use agentscope_core::model::{ChatRequest, Usage};
    use agentscope_core::Msg;

    fn reply_with_usage(input: u32, output: u32) -> Msg {
        Msg::assistant("Friday", "done").with_metadata(
            "usage",
            serde_json::to_value(Usage::new(input, output)).unwrap(),
        )
    }

    async fn fire(hook: &TracingHook, mut event: HookEvent) {
        hook.on_event(&mut event).await;
    }

    #[tokio::test]
    async fn traces_a_full_call() {
        let engine = Arc::new(TelemetryEngine::default());
        let hook = TracingHook::new(engine.clone());
        let agent = "Friday".to_string();

        fire(&hook, HookEvent::PreCall { agent: agent.clone(), input: vec![Msg::user("user", "hi")] }).await;
        fire(&hook, HookEvent::PreReasoning {
            agent: agent.clone(),
            request: ChatRequest::new("qwen-max", vec![]),
        })
        .await;
        fire(&hook, HookEvent::PostReasoning { agent: agent.clone(), msg: reply_with_usage(100, 20) }).await;
        fire(&hook, HookEvent::PreActing {
            agent: agent.clone(),
            tool_use: ContentBlock::tool_use("t1", "view_text_file", serde_json::json!({})),
        })
        .await;
        fire(&hook, HookEvent::PostActing {
            agent: agent.clone(),
            tool_use: ContentBlock::tool_use("t1", "view_text_file", serde_json::json!({})),
            result: ContentBlock::tool_result("t1", "view_text_file", vec![ContentBlock::text("no such file")], true),
        })
        .await;
        fire(&hook, HookEvent::PostCall { agent: agent.clone(), output: Msg::assistant("Friday", "done") }).await;

        let trace = &engine.recent_traces(1)[0];
        assert!(trace.is_complete());
        assert_eq!(trace.spans.len(), 3);
        let root = trace.root().unwrap();
        assert_eq!(root.success, Some(true));
        assert!(trace.spans.iter().filter(|s| s.kind != SpanKind::AgentCall).all(|s| s.parent_id.as_deref() == Some(root.id.as_str())));

        let summary = engine.summary();
        assert_eq!(summary.model_calls, 1);
        assert_eq!(summary.input_tokens, 100);
        assert_eq!(summary.output_tokens, 20);
        assert_eq!(summary.tool_calls, 1);
        assert_eq!(summary.failed_tool_calls, 1);
        assert_eq!(summary.by_model[0].model, "qwen-max");
    }

    #[tokio::test]
    async fn error_closes_open_spans_as_failed() {
        let engine = Arc::new(TelemetryEngine::default());
        let hook = TracingHook::new(engine.clone());
        let agent = "Friday".to_string();

        fire(&hook, HookEvent::PreCall { agent: agent.clone(), input: vec![] }).await;
        fire(&hook, HookEvent::PreReasoning {
            agent: agent.clone(),
            request: ChatRequest::new("qwen-max", vec![]),
        })
        .await;
        fire(&hook, HookEvent::Error { agent: agent.clone(), error: "rate limited".into() }).await;

        let trace = &engine.recent_traces(1)[0];
        assert!(trace.failed());
        assert_eq!(trace.root().unwrap().metadata["error"], "rate limited");
        assert!(trace.spans.iter().all(|s| s.success == Some(false)));
        assert_eq!(engine.summary().failed_calls, 1);
    }

    #[tokio::test]
    async fn events_without_open_call_are_ignored() {
        let engine = Arc::new(TelemetryEngine::default());
        let hook = TracingHook::new(engine.clone());
        fire(&hook, HookEvent::PostCall { agent: "ghost".into(), output: Msg::assistant("ghost", "") }).await;
        assert_eq!(engine.trace_count(), 0);
        assert_eq!(engine.summary(), TelemetrySummary::default());
    }
}
