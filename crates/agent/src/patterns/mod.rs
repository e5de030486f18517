//! Multi-agent patterns.
//!
//! - [`AgentTool`]: expose an agent to another agent as a tool
//! - [`sequential_pipeline`] / [`fanout_pipeline`]: chain or fan out calls
//! - [`MsgHub`]: a room where participants observe each other's replies

pub mod agent_tool;
pub mod hub;
pub mod pipeline;

pub use agent_tool::AgentTool;
pub use hub::MsgHub;
pub use pipeline::{fanout_pipeline, sequential_pipeline};
