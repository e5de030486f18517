//! `agentscope call` — send one message to a remote A2A agent.

use std::path::Path;

use agentscope_a2a::{A2aAgent, StaticAgentRegistry};
use agentscope_config::AppConfig;
use agentscope_core::{Agent, Msg};

use super::{CliResult, load_config, render_events};

fn is_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// Resolve `target` as a URL, or as a name from the config's agent list.
pub async fn resolve(config: &AppConfig, target: &str) -> CliResult<A2aAgent> {
    if is_url(target) {
        return Ok(A2aAgent::connect(target).await?);
    }
    let registry = StaticAgentRegistry::from_config(&config.a2a.agents);
    if !registry.contains(target) {
        let known = registry.names();
        let hint = if known.is_empty() {
            "no agents are configured under [[a2a.agents]]".to_string()
        } else {
            format!("known agents: {}", known.join(", "))
        };
        return Err(format!("'{target}' is neither a URL nor a known agent ({hint})").into());
    }
    Ok(registry.agent(target).await?)
}

pub async fn run(config_path: Option<&Path>, target: &str, message: &str, stream: bool) -> CliResult<()> {
    let config = load_config(config_path)?;
    let agent = resolve(&config, target).await?;
    let msg = Msg::user("user", message);

    if stream {
        let agent = agent.with_streaming(true);
        let events = agent.stream(vec![msg]).await?;
        render_events(events, true).await?;
    } else {
        let reply = agent.call(vec![msg]).await?;
        println!("{}", reply.text_content());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscope_config::RemoteAgentConfig;

    #[test]
    fn recognizes_urls() {
        assert!(is_url("http://localhost:8080"));
        assert!(is_url("https://agents.example.com"));
        assert!(!is_url("weather"));
    }

    #[tokio::test]
    async fn unknown_name_lists_known_agents() {
        let mut config = AppConfig::default();
        config.a2a.agents.push(RemoteAgentConfig {
            name: "weather".into(),
            url: "http://127.0.0.1:9".into(),
        });
        let Err(err) = resolve(&config, "news").await else {
            panic!("expected an unknown-agent error");
        };
        assert!(err.to_string().contains("known agents: weather"));
    }
}
