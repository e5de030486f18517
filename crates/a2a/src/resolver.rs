//! Agent card resolution and the registry of named remote agents.

use std::collections::BTreeMap;
use std::sync::Arc;

use agentscope_config::RemoteAgentConfig;
use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::agent::A2aAgent;
use crate::client::A2aClient;
use crate::error::A2aError;
use crate::types::AgentCard;

/// Produces the card of a remote agent.
#[async_trait]
pub trait AgentCardResolver: Send + Sync {
    async fn resolve(&self) -> Result<AgentCard, A2aError>;
}

/// A card known up front.
pub struct FixedAgentCardResolver(pub AgentCard);

#[async_trait]
impl AgentCardResolver for FixedAgentCardResolver {
    async fn resolve(&self) -> Result<AgentCard, A2aError> {
        Ok(self.0.clone())
    }
}

/// Fetches the card from the server's well-known path, once.
pub struct WellKnownAgentCardResolver {
    base_url: String,
    cache: OnceCell<AgentCard>,
}

impl WellKnownAgentCardResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            cache: OnceCell::new(),
        }
    }
}

#[async_trait]
impl AgentCardResolver for WellKnownAgentCardResolver {
    async fn resolve(&self) -> Result<AgentCard, A2aError> {
        self.cache
            .get_or_try_init(|| A2aClient::fetch_agent_card(&self.base_url))
            .await
            .cloned()
    }
}

/// Remote agents addressable by name.
#[derive(Default, Clone)]
pub struct StaticAgentRegistry {
    resolvers: BTreeMap<String, Arc<dyn AgentCardResolver>>,
}

impl StaticAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, resolver: Arc<dyn AgentCardResolver>) {
        self.resolvers.insert(name.into(), resolver);
    }

    /// One well-known resolver per configured agent.
    pub fn from_config(agents: &[RemoteAgentConfig]) -> Self {
        let mut registry = Self::new();
        for agent in agents {
            registry.register(
                agent.name.as_str(),
                Arc::new(WellKnownAgentCardResolver::new(agent.url.as_str())),
            );
        }
        registry
    }

    pub fn names(&self) -> Vec<&str> {
        self.resolvers.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub async fn card(&self, name: &str) -> Result<AgentCard, A2aError> {
        let resolver = self
            .resolvers
            .get(name)
            .ok_or_else(|| A2aError::CardUnavailable(format!("no remote agent named '{name}'")))?;
        resolver.resolve().await
    }

    /// A fresh agent for `name`, carrying the registered name.
    pub async fn agent(&self, name: &str) -> Result<A2aAgent, A2aError> {
        let card = self.card(name).await?;
        let streaming = card.capabilities.streaming;
        Ok(A2aAgent::new(name, A2aClient::from_card(&card)?).with_streaming(streaming))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscope_core::Agent;

    #[tokio::test]
    async fn registry_resolves_fixed_cards() {
        let mut registry = StaticAgentRegistry::new();
        registry.register(
            "weather",
            Arc::new(FixedAgentCardResolver(AgentCard::new("Weather", "forecasts", "http://127.0.0.1:9/"))),
        );
        assert_eq!(registry.names(), vec!["weather"]);
        assert!(registry.contains("weather"));

        let card = registry.card("weather").await.unwrap();
        assert_eq!(card.description, "forecasts");

        let agent = registry.agent("weather").await.unwrap();
        assert_eq!(agent.name(), "weather");
    }

    #[tokio::test]
    async fn unknown_name_is_card_unavailable() {
        let registry = StaticAgentRegistry::new();
        assert!(matches!(
            registry.card("nobody").await,
            Err(A2aError::CardUnavailable(_))
        ));
    }

    #[test]
    fn from_config_registers_every_agent() {
        let registry = StaticAgentRegistry::from_config(&[
            RemoteAgentConfig {
                name: "b".into(),
                url: "http://b".into(),
            },
            RemoteAgentConfig {
                name: "a".into(),
                url: "http://a".into(),
            },
        ]);
        assert_eq!(registry.names(), vec!["a", "b"]);
    }
}
