//! Model router — builds chat and embedding models from config and hands
//! them out by provider name.

use agentscope_config::{AppConfig, ProviderConfig};
use agentscope_core::{ChatModel, EmbeddingModel, ModelError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dashscope::{DashScopeChatModel, DashScopeEmbeddingModel};
use crate::ollama::{OllamaChatModel, OllamaEmbeddingModel};
use crate::openai::{OpenAiChatModel, OpenAiEmbeddingModel};

/// Routes requests to the chat model of a provider.
pub struct ModelRouter {
    models: HashMap<String, Arc<dyn ChatModel>>,
    default_provider: String,
}

impl ModelRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            models: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a model under a provider name.
    pub fn register(&mut self, name: impl Into<String>, model: Arc<dyn ChatModel>) {
        self.models.insert(name.into(), model);
    }

    /// The model of the default provider.
    pub fn default(&self) -> Option<Arc<dyn ChatModel>> {
        self.models.get(&self.default_provider).cloned()
    }

    /// Get a specific provider's model by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ChatModel>> {
        self.models.get(name).cloned()
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build a router holding every configured provider plus the default one.
pub fn build_from_config(config: &AppConfig) -> Result<ModelRouter, ModelError> {
    let mut router = ModelRouter::new(&config.model.provider);

    for (name, provider_config) in &config.providers {
        let model_name = if *name == config.model.provider {
            config.model.name.clone()
        } else {
            provider_config
                .default_model
                .clone()
                .unwrap_or_else(|| default_model(name).to_string())
        };
        router.register(name.clone(), build_chat_model(name, provider_config, &model_name)?);
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.model.provider).is_none() {
        let model = build_chat_model(
            &config.model.provider,
            &ProviderConfig::default(),
            &config.model.name,
        )?;
        router.register(config.model.provider.clone(), model);
    }

    debug!(providers = ?router.list(), default = %config.model.provider, "Model router ready");
    Ok(router)
}

/// Build one chat model.
///
/// `dashscope` and `ollama` use their native APIs; every other name is
/// treated as an OpenAI-compatible endpoint.
pub fn build_chat_model(
    provider: &str,
    config: &ProviderConfig,
    model: &str,
) -> Result<Arc<dyn ChatModel>, ModelError> {
    if config.api_key.is_none() && provider != "ollama" {
        warn!(provider, "No API key configured; requests will likely be rejected");
    }
    let api_key = config.api_key.clone().unwrap_or_default();

    Ok(match provider {
        "dashscope" => {
            let mut m = DashScopeChatModel::new(api_key, model)?;
            if let Some(url) = &config.base_url {
                m = m.with_base_url(url);
            }
            Arc::new(m)
        }
        "ollama" => Arc::new(OllamaChatModel::new(config.base_url.as_deref(), model)?),
        other => {
            let base_url = config
                .base_url
                .clone()
                .or_else(|| default_base_url(other).map(String::from))
                .ok_or_else(|| {
                    ModelError::NotConfigured(format!("provider '{other}' needs a base_url"))
                })?;
            Arc::new(OpenAiChatModel::new(other, base_url, Some(api_key), model)?)
        }
    })
}

/// Build the embedding model named by `model.embedding_model`, if any.
pub fn build_embedding_from_config(
    config: &AppConfig,
) -> Result<Option<Arc<dyn EmbeddingModel>>, ModelError> {
    let Some(model) = &config.model.embedding_model else {
        return Ok(None);
    };
    let provider = config.model.provider.as_str();
    let settings = config.provider(provider).cloned().unwrap_or_default();
    let api_key = settings.api_key.clone().unwrap_or_default();

    let embedding: Arc<dyn EmbeddingModel> = match provider {
        "dashscope" => {
            let mut m = DashScopeEmbeddingModel::new(api_key, model)?;
            if let Some(url) = &settings.base_url {
                m = m.with_base_url(url);
            }
            Arc::new(m)
        }
        "ollama" => Arc::new(OllamaEmbeddingModel::new(settings.base_url.as_deref(), model)?),
        other => {
            let base_url = settings
                .base_url
                .clone()
                .or_else(|| default_base_url(other).map(String::from))
                .ok_or_else(|| {
                    ModelError::NotConfigured(format!("provider '{other}' needs a base_url"))
                })?;
            Arc::new(OpenAiEmbeddingModel::new(base_url, Some(api_key), model)?)
        }
    };
    Ok(Some(embedding))
}

/// Base URLs of well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openai" => Some(crate::openai::OPENAI_BASE_URL),
        "dashscope-compatible" => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "vllm" => Some("http://localhost:8000/v1"),
        _ => None,
    }
}

fn default_model(provider_name: &str) -> &'static str {
    match provider_name {
        "dashscope" | "dashscope-compatible" => "qwen-plus",
        "openai" => "gpt-4o-mini",
        "ollama" => "qwen3:8b",
        "deepseek" => "deepseek-chat",
        _ => "default",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ModelRouter::new("openai");
        let model = OpenAiChatModel::openai("sk-test", "gpt-4o-mini").unwrap();
        router.register("openai", Arc::new(model));

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let router = build_from_config(&config).unwrap();
        let model = router.default().unwrap();
        assert_eq!(model.name(), "dashscope");
        assert_eq!(model.model_name(), "qwen-plus");
    }

    #[test]
    fn configured_providers_are_all_registered() {
        let mut config = AppConfig::default();
        config.model.provider = "ollama".into();
        config.model.name = "llama3.1".into();
        config.providers.insert("openai".into(), ProviderConfig {
            api_key: Some("sk".into()),
            ..Default::default()
        });
        let router = build_from_config(&config).unwrap();
        assert_eq!(router.list(), vec!["ollama", "openai"]);
        assert_eq!(router.default().unwrap().model_name(), "llama3.1");
        assert_eq!(router.get("openai").unwrap().model_name(), "gpt-4o-mini");
    }

    #[test]
    fn unknown_provider_without_base_url_fails() {
        let result = build_chat_model("mystery", &ProviderConfig::default(), "m");
        assert!(matches!(result, Err(ModelError::NotConfigured(_))));

        let config = ProviderConfig {
            base_url: Some("http://localhost:9999/v1".into()),
            ..Default::default()
        };
        let model = build_chat_model("mystery", &config, "m").unwrap();
        assert_eq!(model.name(), "mystery");
    }

    #[test]
    fn embedding_only_when_configured() {
        let mut config = AppConfig::default();
        assert!(build_embedding_from_config(&config).unwrap().is_none());
        config.model.embedding_model = Some("text-embedding-v3".into());
        let embedding = build_embedding_from_config(&config).unwrap().unwrap();
        assert_eq!(embedding.name(), "text-embedding-v3");
    }
}
