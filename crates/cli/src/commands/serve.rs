//! `agentscope serve` — expose the ReAct agent over A2A.

use std::path::Path;
use std::sync::Arc;

use agentscope_a2a::server::{AgentFactory, AgentScopeExecutor, agent_card};
use agentscope_core::Agent;
use tracing::debug;

use super::{AgentRuntime, CliResult, load_config};

pub async fn run(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> CliResult<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.a2a.server.host = host;
    }
    if let Some(port) = port {
        config.a2a.server.port = port;
    }
    config.validate()?;

    let server = config.a2a.server.clone();
    let card = agent_card(&config.agent.name, &server);
    let runtime = Arc::new(AgentRuntime::from_config(config).await?);
    let executor = Arc::new(AgentScopeExecutor::new(factory(Arc::clone(&runtime))));

    println!("AgentScope A2A server");
    println!("   Agent:     {}", card.name);
    println!("   Listening: {}:{}", server.host, server.port);
    println!("   Card:      {}", agentscope_a2a::client::card_url(&card.url));

    agentscope_a2a::server::serve(&server, card, executor).await?;
    Ok(())
}

/// One fresh agent per A2A context.
fn factory(runtime: Arc<AgentRuntime>) -> Arc<dyn AgentFactory> {
    Arc::new(move |context_id: &str| -> agentscope_core::Result<Arc<dyn Agent>> {
        debug!(context_id, "Building agent for new context");
        Ok(Arc::new(runtime.agent()?))
    })
}
