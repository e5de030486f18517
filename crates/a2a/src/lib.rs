//! Agent-to-Agent (A2A) protocol support for AgentScope.
//!
//! - [`A2aClient`] speaks JSON-RPC to a remote A2A server.
//! - [`A2aAgent`] wraps a remote server as an ordinary [`agentscope_core::Agent`].
//! - [`server`] publishes a local agent, with its agent card, tasks and
//!   SSE streaming.
//! - [`convert`] maps messages between the two worlds.

pub mod agent;
pub mod client;
pub mod convert;
pub mod error;
pub mod resolver;
pub mod server;
mod sse;
pub mod types;

pub use agent::A2aAgent;
pub use client::{A2aClient, A2aStream};
pub use error::A2aError;
pub use resolver::{AgentCardResolver, FixedAgentCardResolver, StaticAgentRegistry, WellKnownAgentCardResolver};
pub use types::{AgentCard, AgentSkill, Message, Part, Task, TaskState};
