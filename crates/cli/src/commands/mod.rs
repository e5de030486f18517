//! Subcommands and the pieces they share.

pub mod call;
pub mod card;
pub mod chat;
pub mod init;
pub mod models;
pub mod serve;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use agentscope_agent::ReActAgent;
use agentscope_config::AppConfig;
use agentscope_core::error::AgentError;
use agentscope_core::{
    AgentEvent, ChatModel, EmbeddingModel, GenerateOptions, Knowledge, LongTermMemory, Msg, RetrieveConfig,
};
use agentscope_memory::{
    InMemoryLongTermMemory, InMemoryMemory, KeywordKnowledge, SimpleKnowledge, TextReader, VectorLongTermMemory,
};
use agentscope_telemetry::{TelemetryEngine, TracingHook};
use tokio::sync::mpsc;
use tracing::info;

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path).map_err(|e| format!("Failed to load config: {e}"))?;
            config.apply_env(|key| std::env::var(key).ok());
            config.validate()?;
            config
        }
        None => AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?,
    };
    Ok(config)
}

/// Everything needed to build ReAct agents from a config.
///
/// Models, the knowledge base and telemetry are built once; every agent
/// gets its own memory.
pub struct AgentRuntime {
    config: AppConfig,
    model: Arc<dyn ChatModel>,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    knowledge: Option<Arc<dyn Knowledge>>,
    telemetry: Option<Arc<TelemetryEngine>>,
}

impl AgentRuntime {
    pub async fn from_config(config: AppConfig) -> CliResult<Self> {
        let router = agentscope_providers::build_from_config(&config)?;
        let model = router.default().ok_or("No default provider configured")?;
        let embedder = agentscope_providers::build_embedding_from_config(&config)?;
        let knowledge = load_knowledge(&config, embedder.clone()).await?;
        let telemetry = config
            .telemetry
            .enabled
            .then(|| Arc::new(TelemetryEngine::from_config(&config.telemetry)));
        Ok(Self {
            config,
            model,
            embedder,
            knowledge,
            telemetry,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    pub fn telemetry(&self) -> Option<&Arc<TelemetryEngine>> {
        self.telemetry.as_ref()
    }

    /// A fresh agent with its own short- and long-term memory.
    pub fn agent(&self) -> Result<ReActAgent, AgentError> {
        let config = &self.config;
        let memory = match config.memory.max_messages {
            Some(max) => InMemoryMemory::with_window(max),
            None => InMemoryMemory::new(),
        };
        let options = GenerateOptions {
            temperature: config.model.temperature,
            max_tokens: config.model.max_tokens,
            enable_thinking: config.model.enable_thinking,
            ..Default::default()
        };

        let mut builder = ReActAgent::builder()
            .config(&config.agent)
            .model(Arc::clone(&self.model))
            .toolkit(agentscope_tools::builtin_toolkit(&config.tools))
            .memory(Arc::new(memory))
            .stream(config.model.stream)
            .options(options);

        if config.memory.long_term {
            let ltm: Arc<dyn LongTermMemory> = match &self.embedder {
                Some(embedder) => Arc::new(VectorLongTermMemory::new(Arc::clone(embedder))),
                None => Arc::new(InMemoryLongTermMemory::new()),
            };
            builder = builder
                .long_term_memory(ltm, config.memory.long_term_mode)
                .recall_limit(config.memory.recall_limit);
        }
        if let Some(knowledge) = &self.knowledge {
            builder = builder
                .knowledge(Arc::clone(knowledge), config.knowledge.rag_mode)
                .retrieve_config(RetrieveConfig {
                    limit: config.knowledge.top_k,
                    score_threshold: config.knowledge.score_threshold,
                });
        }
        if let Some(engine) = &self.telemetry {
            builder = builder.hook(Arc::new(TracingHook::new(Arc::clone(engine))));
        }
        builder.build()
    }

    /// Print the telemetry totals, if any calls were traced.
    pub fn print_usage(&self) {
        let Some(engine) = &self.telemetry else {
            return;
        };
        let summary = engine.summary();
        if summary.traces == 0 {
            return;
        }
        eprintln!(
            "  [usage] {} calls, {} model calls, {} tool calls, {} tokens ({} in / {} out), {} failed",
            summary.agent_calls,
            summary.model_calls,
            summary.tool_calls,
            summary.total_tokens(),
            summary.input_tokens,
            summary.output_tokens,
            summary.failed_calls,
        );
    }
}

async fn load_knowledge(
    config: &AppConfig,
    embedder: Option<Arc<dyn EmbeddingModel>>,
) -> CliResult<Option<Arc<dyn Knowledge>>> {
    if config.knowledge.paths.is_empty() {
        return Ok(None);
    }
    let reader = TextReader::new(config.knowledge.chunk_size, config.knowledge.chunk_overlap);
    let knowledge: Arc<dyn Knowledge> = match embedder {
        Some(embedder) => Arc::new(SimpleKnowledge::new(embedder)),
        None => Arc::new(KeywordKnowledge::new()),
    };
    for path in &config.knowledge.paths {
        let docs = reader.read_file(path).await?;
        let added = knowledge.add_documents(docs).await?;
        info!(path = %path, chunks = added, "Loaded knowledge");
    }
    Ok(Some(knowledge))
}

/// Print an agent's events until the call ends; returns the reply.
///
/// With `live`, text chunks are printed as they arrive. Tool activity is
/// always shown on stderr.
pub async fn render_events(mut events: mpsc::Receiver<AgentEvent>, live: bool) -> CliResult<Msg> {
    let mut printed_live = false;
    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::ReasoningChunk { text } if live => {
                print!("{text}");
                std::io::stdout().flush()?;
                printed_live = true;
            }
            AgentEvent::ReasoningChunk { .. } | AgentEvent::Thinking { .. } => {}
            AgentEvent::ToolUse { name, input, .. } => {
                if printed_live {
                    println!();
                    printed_live = false;
                }
                eprintln!("  [tool] {name}({input})");
            }
            AgentEvent::ToolResult {
                name, output, is_error, ..
            } => {
                let text = agentscope_core::message::blocks_to_text(&output);
                let tag = if is_error { "error" } else { "result" };
                eprintln!("  [{tag}] {name}: {}", truncate(&text, 200));
            }
            AgentEvent::Reply { msg } => println!("  {} > {}", msg.name, msg.text_content()),
            AgentEvent::Done { msg, .. } => {
                if printed_live {
                    println!();
                } else {
                    println!("{}", msg.text_content());
                }
                return Ok(msg);
            }
            AgentEvent::Error { message } => {
                if printed_live {
                    println!();
                }
                return Err(message.into());
            }
        }
    }
    Err("agent stopped without a reply".into())
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("short", 10), "short");
    }

    #[tokio::test]
    async fn render_returns_the_done_message() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(AgentEvent::ReasoningChunk { text: "hi".into() }).await.unwrap();
        tx.send(AgentEvent::Done {
            msg: Msg::assistant("Friday", "hi"),
            iterations: 1,
            usage: Default::default(),
        })
        .await
        .unwrap();
        let msg = render_events(rx, false).await.unwrap();
        assert_eq!(msg.text_content(), "hi");
    }

    #[tokio::test]
    async fn render_surfaces_errors() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(AgentEvent::Error {
            message: "model down".into(),
        })
        .await
        .unwrap();
        let err = render_events(rx, true).await.unwrap_err();
        assert_eq!(err.to_string(), "model down");
    }

    #[tokio::test]
    async fn runtime_builds_agents_from_defaults() {
        let mut config = AppConfig::default();
        config.telemetry.enabled = true;
        let runtime = AgentRuntime::from_config(config).await.unwrap();
        let agent = runtime.agent().unwrap();
        assert!(agent.sys_prompt().contains("Friday"));
        assert!(runtime.telemetry().is_some());
    }
}
