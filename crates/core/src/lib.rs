//! # AgentScope Core
//!
//! Domain types, traits, and error definitions for the AgentScope agent framework.
//! Every other crate implements against the model defined here: messages and
//! content blocks, chat models, tools, memory, knowledge, hooks and agents.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping model providers and memory backends via configuration
//! - Easy testing with scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod event;
pub mod hook;
pub mod knowledge;
pub mod memory;
pub mod message;
pub mod model;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::Agent;
pub use error::{AgentError, Error, MemoryError, ModelError, Result, ToolError};
pub use event::AgentEvent;
pub use hook::{Hook, HookEvent};
pub use knowledge::{Document, Knowledge, RagMode, RetrieveConfig};
pub use memory::{LongTermMemory, LongTermMemoryMode, Memory, MemoryItem};
pub use message::{ContentBlock, Msg, MsgRole, Source};
pub use model::{
    ChatChunk, ChatModel, ChatRequest, ChatResponse, ChunkAccumulator, ChunkStream, EmbeddingModel,
    GenerateOptions, ToolChoice, ToolSchema, Usage,
};
pub use tool::{Tool, ToolOutput, Toolkit};
