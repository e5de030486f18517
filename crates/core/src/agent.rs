//! Agent trait — anything that can take messages and reply.
//!
//! ReAct agents, user proxies and remote A2A agents all implement [`Agent`],
//! so pipelines, hubs and the A2A server treat them uniformly.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::event::AgentEvent;
use crate::message::Msg;
use crate::model::Usage;

/// Channel capacity for agent event streams.
pub const EVENT_BUFFER: usize = 64;

#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique id of this agent instance.
    fn id(&self) -> &str;

    /// Display name, used as `Msg::name` of replies.
    fn name(&self) -> &str;

    /// Process `msgs` and produce a reply.
    async fn call(&self, msgs: Vec<Msg>) -> Result<Msg>;

    /// Take `msgs` into memory without replying.
    async fn observe(&self, msgs: Vec<Msg>) -> Result<()>;

    /// Process `msgs`, reporting progress as events.
    ///
    /// The default runs `call` and emits a single `Done` (or `Error`).
    async fn stream(&self, msgs: Vec<Msg>) -> Result<mpsc::Receiver<AgentEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let event = match self.call(msgs).await {
            Ok(msg) => AgentEvent::Done {
                msg,
                iterations: 1,
                usage: Usage::default(),
            },
            Err(e) => AgentEvent::Error {
                message: e.to_string(),
            },
        };
        let _ = tx.send(event).await;
        Ok(rx)
    }

    /// Ask a running call to stop at the next safe point.
    async fn interrupt(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        fn id(&self) -> &str {
            "echo-1"
        }
        fn name(&self) -> &str {
            "echo"
        }
        async fn call(&self, msgs: Vec<Msg>) -> Result<Msg> {
            let text = msgs.last().map(|m| m.text_content()).unwrap_or_default();
            Ok(Msg::assistant(self.name(), text))
        }
        async fn observe(&self, _msgs: Vec<Msg>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_stream_emits_done() {
        let mut rx = Echo.stream(vec![Msg::user("user", "ping")]).await.unwrap();
        match rx.recv().await {
            Some(AgentEvent::Done { msg, .. }) => assert_eq!(msg.text_content(), "ping"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}
