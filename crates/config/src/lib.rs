//! Configuration loading, validation, and management for AgentScope.
//!
//! Loads configuration from `~/.agentscope/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use agentscope_core::{LongTermMemoryMode, RagMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentscope/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default chat model
    #[serde(default)]
    pub model: ModelConfig,

    /// Provider-specific configurations (dashscope, openai, ollama)
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// ReAct agent settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Short- and long-term memory
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Knowledge base (RAG)
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Agent-to-Agent server and remote agents
    #[serde(default)]
    pub a2a: A2aConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_provider() -> String {
    "dashscope".into()
}
fn default_model() -> String {
    "qwen-plus".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stream model output
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Ask reasoning models for their thinking
    #[serde(default)]
    pub enable_thinking: bool,

    /// Embedding model used by vector memory and the knowledge base
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            stream: true,
            enable_thinking: false,
            embedding_model: None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_sys_prompt")]
    pub sys_prompt: String,

    #[serde(default = "default_max_iters")]
    pub max_iters: usize,

    /// Run the tool calls of one reasoning step concurrently
    #[serde(default)]
    pub parallel_tool_calls: bool,
}

fn default_agent_name() -> String {
    "Friday".into()
}
fn default_sys_prompt() -> String {
    "You are a helpful assistant named Friday. Use the available tools when they help you answer.".into()
}
fn default_max_iters() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            sys_prompt: default_sys_prompt(),
            max_iters: default_max_iters(),
            parallel_tool_calls: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Keep at most this many messages in short-term memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,

    /// Enable long-term memory
    #[serde(default)]
    pub long_term: bool,

    #[serde(default)]
    pub long_term_mode: LongTermMemoryMode,

    /// How many long-term items to recall per call
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
}

fn default_recall_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: None,
            long_term: false,
            long_term_mode: LongTermMemoryMode::default(),
            recall_limit: default_recall_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Files loaded into the knowledge base at startup
    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub score_threshold: f32,

    #[serde(default)]
    pub rag_mode: RagMode,
}

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    64
}
fn default_top_k() -> usize {
    5
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            paths: vec![],
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            score_threshold: 0.0,
            rag_mode: RagMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub shell_enabled: bool,

    /// Commands the shell tool may run. Empty allows any command.
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,

    /// Roots the file tools may touch. Empty allows the current directory.
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    #[serde(default)]
    pub forbidden_paths: Vec<String>,
}

fn default_shell_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_enabled: true,
            allowed_commands: vec![
                "ls".into(),
                "cat".into(),
                "echo".into(),
                "grep".into(),
                "pwd".into(),
                "date".into(),
            ],
            shell_timeout_secs: default_shell_timeout(),
            allowed_roots: vec![],
            forbidden_paths: vec![
                "/etc".into(),
                "/proc".into(),
                "/sys".into(),
                "~/.ssh".into(),
                "~/.gnupg".into(),
                "~/.aws".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct A2aConfig {
    #[serde(default)]
    pub server: A2aServerConfig,

    /// Remote agents reachable by name
    #[serde(default)]
    pub agents: Vec<RemoteAgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Public URL advertised in the agent card. Defaults to `http://host:port/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    #[serde(default = "default_card_description")]
    pub description: String,

    #[serde(default = "default_card_version")]
    pub version: String,

    #[serde(default)]
    pub skills: Vec<SkillConfig>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_card_description() -> String {
    "An AgentScope ReAct agent".into()
}
fn default_card_version() -> String {
    "1.0.0".into()
}

impl Default for A2aServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            description: default_card_description(),
            version: default_card_version(),
            skills: vec![],
        }
    }
}

impl A2aServerConfig {
    pub fn url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/", self.host, self.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// A remote A2A agent known by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAgentConfig {
    pub name: String,
    /// Base URL; the card is fetched from `/.well-known/agent-card.json`
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Completed traces kept in memory
    #[serde(default = "default_max_traces")]
    pub max_traces: usize,
}

fn default_max_traces() -> usize {
    1000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_traces: default_max_traces(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentscope/config.toml).
    ///
    /// Environment overrides:
    /// - `AGENTSCOPE_PROVIDER`, `AGENTSCOPE_MODEL`
    /// - `DASHSCOPE_API_KEY`, `OPENAI_API_KEY`, `OLLAMA_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Keys found in the environment win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("AGENTSCOPE_PROVIDER") {
            self.model.provider = provider;
        }
        if let Some(model) = lookup("AGENTSCOPE_MODEL") {
            self.model.name = model;
        }
        for (provider, var) in [("dashscope", "DASHSCOPE_API_KEY"), ("openai", "OPENAI_API_KEY")] {
            if let Some(key) = lookup(var) {
                self.providers.entry(provider.into()).or_default().api_key = Some(key);
            }
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.providers.entry("ollama".into()).or_default().base_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentscope")
    }

    /// Settings of `name`, if configured.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iters == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iters must be > 0".into(),
            ));
        }

        if self.knowledge.chunk_size == 0 || self.knowledge.chunk_overlap >= self.knowledge.chunk_size {
            return Err(ConfigError::ValidationError(
                "knowledge.chunk_overlap must be smaller than a non-zero knowledge.chunk_size".into(),
            ));
        }

        if self.a2a.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "a2a.server.port must not be 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for agentscope_core::Error {
    fn from(e: ConfigError) -> Self {
        agentscope_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.model.provider, "dashscope");
        assert_eq!(config.agent.max_iters, 10);
        assert_eq!(config.a2a.server.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.name, config.model.name);
        assert_eq!(parsed.knowledge.chunk_size, config.knowledge.chunk_size);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.model.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_iters_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_iters = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let mut config = AppConfig::default();
        config.knowledge.chunk_overlap = config.knowledge.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_port_rejected() {
        let mut config = AppConfig::default();
        config.a2a.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model.provider, "dashscope");
    }

    #[test]
    fn load_from_file_with_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[model]
provider = "ollama"
name = "qwen3:8b"

[providers.ollama]
base_url = "http://gpu-box:11434"

[memory]
long_term = true
long_term_mode = "both"

[knowledge]
rag_mode = "agentic"

[[a2a.agents]]
name = "weather"
url = "http://localhost:9001"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model.provider, "ollama");
        assert_eq!(config.model.name, "qwen3:8b");
        assert_eq!(
            config.provider("ollama").and_then(|p| p.base_url.as_deref()),
            Some("http://gpu-box:11434")
        );
        assert_eq!(config.memory.long_term_mode, LongTermMemoryMode::Both);
        assert_eq!(config.knowledge.rag_mode, RagMode::Agentic);
        assert_eq!(config.a2a.agents[0].name, "weather");
        // Untouched sections keep defaults
        assert_eq!(config.agent.max_iters, 10);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[model\nprovider = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_win() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "AGENTSCOPE_PROVIDER" => Some("openai".into()),
            "AGENTSCOPE_MODEL" => Some("gpt-4o-mini".into()),
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "OLLAMA_BASE_URL" => Some("http://ollama:11434".into()),
            _ => None,
        });
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.model.name, "gpt-4o-mini");
        assert_eq!(config.providers["openai"].api_key.as_deref(), Some("sk-test"));
        assert_eq!(
            config.providers["ollama"].base_url.as_deref(),
            Some("http://ollama:11434")
        );
        assert!(!config.providers.contains_key("dashscope"));
    }

    #[test]
    fn debug_redacts_api_keys() {
        let provider = ProviderConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn server_url_defaults_to_host_and_port() {
        let server = A2aServerConfig::default();
        assert_eq!(server.url(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("dashscope"));
        assert!(toml_str.contains("8080"));
    }
}
