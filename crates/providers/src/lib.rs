//! Chat and embedding model implementations for AgentScope.
//!
//! All chat models implement `agentscope_core::ChatModel`; embedding models
//! implement `agentscope_core::EmbeddingModel`. The router builds them from
//! configuration.

mod http;

pub mod dashscope;
pub mod ollama;
pub mod openai;
pub mod router;

pub use dashscope::{DashScopeChatModel, DashScopeEmbeddingModel};
pub use ollama::{OllamaChatModel, OllamaEmbeddingModel};
pub use openai::{OpenAiChatModel, OpenAiEmbeddingModel};
pub use router::{build_chat_model, build_embedding_from_config, build_from_config, ModelRouter};
