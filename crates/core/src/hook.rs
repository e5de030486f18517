//! Hooks — observe and rewrite what an agent does.
//!
//! Every lifecycle step of an agent fires a [`HookEvent`]. Hooks run in
//! registration order and receive the event mutably, so they can rewrite
//! the reasoning request, the tool input or the tool result in flight.

use async_trait::async_trait;
use std::sync::Arc;

use crate::message::{ContentBlock, Msg};
use crate::model::{ChatChunk, ChatRequest};

#[derive(Debug)]
pub enum HookEvent {
    /// An agent call is starting.
    PreCall { agent: String, input: Vec<Msg> },
    /// An agent call returned.
    PostCall { agent: String, output: Msg },
    /// A model request is about to be sent.
    PreReasoning { agent: String, request: ChatRequest },
    /// The model replied.
    PostReasoning { agent: String, msg: Msg },
    /// A streaming chunk arrived from the model.
    ReasoningChunk { agent: String, chunk: ChatChunk },
    /// A tool is about to run.
    PreActing { agent: String, tool_use: ContentBlock },
    /// A tool finished.
    PostActing {
        agent: String,
        tool_use: ContentBlock,
        result: ContentBlock,
    },
    /// The call failed.
    Error { agent: String, error: String },
}

impl HookEvent {
    pub fn agent(&self) -> &str {
        match self {
            Self::PreCall { agent, .. }
            | Self::PostCall { agent, .. }
            | Self::PreReasoning { agent, .. }
            | Self::PostReasoning { agent, .. }
            | Self::ReasoningChunk { agent, .. }
            | Self::PreActing { agent, .. }
            | Self::PostActing { agent, .. }
            | Self::Error { agent, .. } => agent,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PreCall { .. } => "pre_call",
            Self::PostCall { .. } => "post_call",
            Self::PreReasoning { .. } => "pre_reasoning",
            Self::PostReasoning { .. } => "post_reasoning",
            Self::ReasoningChunk { .. } => "reasoning_chunk",
            Self::PreActing { .. } => "pre_acting",
            Self::PostActing { .. } => "post_acting",
            Self::Error { .. } => "error",
        }
    }
}

#[async_trait]
pub trait Hook: Send + Sync {
    async fn on_event(&self, event: &mut HookEvent);
}

/// Run `event` through `hooks` in order.
pub async fn fire(hooks: &[Arc<dyn Hook>], event: &mut HookEvent) {
    for hook in hooks {
        hook.on_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl Hook for Recorder {
        async fn on_event(&self, event: &mut HookEvent) {
            self.0.lock().unwrap().push(event.name().to_string());
        }
    }

    struct Redactor;

    #[async_trait]
    impl Hook for Redactor {
        async fn on_event(&self, event: &mut HookEvent) {
            if let HookEvent::PreActing { tool_use, .. } = event
                && let ContentBlock::ToolUse { input, .. } = tool_use
            {
                input["secret"] = serde_json::json!("***");
            }
        }
    }

    #[tokio::test]
    async fn hooks_run_in_order_and_can_mutate() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let hooks: Vec<Arc<dyn Hook>> = vec![Arc::new(Redactor), recorder.clone()];

        let mut event = HookEvent::PreActing {
            agent: "a".into(),
            tool_use: ContentBlock::tool_use("1", "t", serde_json::json!({"secret": "pw"})),
        };
        fire(&hooks, &mut event).await;

        match &event {
            HookEvent::PreActing {
                tool_use: ContentBlock::ToolUse { input, .. },
                ..
            } => assert_eq!(input["secret"], "***"),
            _ => panic!("event changed kind"),
        }
        assert_eq!(*recorder.0.lock().unwrap(), vec!["pre_acting"]);
        assert_eq!(event.agent(), "a");
    }
}
