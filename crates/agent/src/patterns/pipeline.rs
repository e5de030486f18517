//! Pipelines — chain agents or fan one message out to many.

use std::sync::Arc;

use agentscope_core::error::Result;
use agentscope_core::{Agent, Msg};
use futures::future::try_join_all;
use tracing::debug;

/// Pass `msg` through `agents` in order, each reply feeding the next agent.
///
/// Returns the last reply, or `msg` unchanged when `agents` is empty.
pub async fn sequential_pipeline(agents: &[Arc<dyn Agent>], msg: Msg) -> Result<Msg> {
    let mut current = msg;
    for (step, agent) in agents.iter().enumerate() {
        debug!(agent = %agent.name(), step, "Sequential pipeline step");
        current = agent.call(vec![current]).await?;
    }
    Ok(current)
}

/// Send the same `msg` to every agent and collect all replies in agent order.
///
/// With `concurrent`, the agents run at the same time and the first error
/// cancels the rest.
pub async fn fanout_pipeline(agents: &[Arc<dyn Agent>], msg: Msg, concurrent: bool) -> Result<Vec<Msg>> {
    debug!(agents = agents.len(), concurrent, "Fan-out pipeline");
    if concurrent {
        return try_join_all(agents.iter().map(|agent| agent.call(vec![msg.clone()]))).await;
    }

    let mut replies = Vec::with_capacity(agents.len());
    for agent in agents {
        replies.push(agent.call(vec![msg.clone()]).await?);
    }
    Ok(replies)
}
