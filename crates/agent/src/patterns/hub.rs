//! Message hub — a shared room where agents see each other's messages.
//!
//! Participants only learn about messages through `observe`; the hub
//! decides who observes what. A typical round:
//!
//! ```text
//! hub.enter()                      // everyone observes the announcement
//! hub.call_participant("alice", …) // alice speaks, the others observe
//! hub.call_participant("bob", …)
//! ```

use std::sync::Arc;

use agentscope_core::error::{AgentError, Result};
use agentscope_core::{Agent, Msg};
use futures::future::try_join_all;
use tracing::{debug, info};

pub struct MsgHub {
    participants: Vec<Arc<dyn Agent>>,
    announcement: Option<Msg>,
    auto_broadcast: bool,
}

impl MsgHub {
    /// A hub that broadcasts every participant reply.
    pub fn new(participants: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            participants,
            announcement: None,
            auto_broadcast: true,
        }
    }

    /// Message every participant observes on [`enter`](Self::enter).
    pub fn with_announcement(mut self, msg: Msg) -> Self {
        self.announcement = Some(msg);
        self
    }

    pub fn auto_broadcast(mut self, enabled: bool) -> Self {
        self.auto_broadcast = enabled;
        self
    }

    /// Names of the current participants, in join order.
    pub fn participants(&self) -> Vec<&str> {
        self.participants.iter().map(|a| a.name()).collect()
    }

    /// Open the hub, delivering the announcement to everyone.
    pub async fn enter(&self) -> Result<()> {
        info!(participants = self.participants.len(), "Entering message hub");
        if let Some(announcement) = &self.announcement {
            self.deliver(announcement.clone(), None).await?;
        }
        Ok(())
    }

    /// Make every participant except the sender observe `msg`.
    ///
    /// The sender is the participant whose name matches `msg.name`.
    pub async fn broadcast(&self, msg: Msg) -> Result<()> {
        let sender = msg.name.clone();
        self.deliver(msg, Some(&sender)).await
    }

    async fn deliver(&self, msg: Msg, skip: Option<&str>) -> Result<()> {
        let audience: Vec<_> = self
            .participants
            .iter()
            .filter(|a| skip.is_none_or(|s| a.name() != s))
            .collect();
        debug!(from = %msg.name, audience = audience.len(), "Broadcasting message");
        try_join_all(audience.into_iter().map(|a| a.observe(vec![msg.clone()]))).await?;
        Ok(())
    }

    pub fn add(&mut self, agent: Arc<dyn Agent>) {
        debug!(agent = %agent.name(), "Participant joined hub");
        self.participants.push(agent);
    }

    /// Remove the participant named `name`. Returns whether one was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|a| a.name() != name);
        before != self.participants.len()
    }

    /// Call the participant named `name`; with auto-broadcast on, the
    /// others observe its reply.
    pub async fn call_participant(&self, name: &str, msgs: Vec<Msg>) -> Result<Msg> {
        let agent = self
            .participants
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| AgentError::NotFound(name.to_string()))?;
        let reply = agent.call(msgs).await?;
        if self.auto_broadcast {
            self.broadcast(reply.clone()).await?;
        }
        Ok(reply)
    }
}
