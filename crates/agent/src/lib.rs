//! Agents for AgentScope.
//!
//! [`ReActAgent`] follows a **Reason → Act → Observe** cycle:
//!
//! 1. **Receive** input messages and store them in memory
//! 2. **Reason**: send system prompt, retrieval hints and memory to the model
//! 3. **Act**: if the reply uses tools, run them and store the results, then loop back to 2
//! 4. **Reply**: a reply without tool use ends the call
//!
//! The loop also ends at `max_iters`, after one final summarizing call.
//! [`UserAgent`] puts a person in the loop, and [`patterns`] combines
//! agents into pipelines, hubs and supervisor/worker setups.

pub mod patterns;
pub mod react;
pub mod test_helpers;
pub mod user;

pub use patterns::{AgentTool, MsgHub, fanout_pipeline, sequential_pipeline};
pub use react::{ReActAgent, ReActAgentBuilder, STRUCTURED_OUTPUT_KEY, STRUCTURED_OUTPUT_TOOL};
pub use user::{InputSource, StdinInput, UserAgent};
