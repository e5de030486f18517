//! A2A server: exposes an AgentScope agent over JSON-RPC and SSE.

pub mod executor;
pub mod handler;
pub mod queue;
pub mod router;
pub mod store;

pub use executor::{AgentExecutor, AgentFactory, AgentScopeExecutor, RequestContext, TaskUpdater};
pub use handler::RequestHandler;
pub use queue::EventQueue;
pub use router::{a2a_router, agent_card, serve, serve_on};
pub use store::{InMemoryTaskStore, TaskStore};
