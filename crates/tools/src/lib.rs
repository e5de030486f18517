//! Built-in tools for AgentScope agents.
//!
//! Tools give the agent the ability to interact with the world:
//! run shell commands, view and edit text files, query a knowledge base,
//! and record or recall long-term memories.

pub mod file_read;
pub mod file_write;
pub mod knowledge;
pub mod long_term_memory;
pub mod path_guard;
pub mod shell;

use std::sync::Arc;
use std::time::Duration;

use agentscope_config::ToolsConfig;
use agentscope_core::tool::Toolkit;

pub use file_read::ViewTextFileTool;
pub use file_write::{InsertTextFileTool, WriteTextFileTool};
pub use knowledge::RetrieveKnowledgeTool;
pub use long_term_memory::{RecordToMemoryTool, RetrieveFromMemoryTool};
pub use path_guard::{PathGuard, PathGuardError};
pub use shell::ShellCommandTool;

pub const FILE_GROUP: &str = "file";
pub const SHELL_GROUP: &str = "shell";

/// Create a toolkit with the built-in shell and file tools.
///
/// Security defaults come from the config:
/// - Shell: only allowlisted commands, killed after the timeout
/// - Files: confined to the allowed roots, sensitive prefixes blocked
pub fn builtin_toolkit(config: &ToolsConfig) -> Toolkit {
    let mut toolkit = Toolkit::new();
    register_builtin_tools(&mut toolkit, config);
    toolkit
}

/// Add the built-in tools to an existing toolkit, each in its own group.
pub fn register_builtin_tools(toolkit: &mut Toolkit, config: &ToolsConfig) {
    let guard = PathGuard::new(config.allowed_roots.clone(), config.forbidden_paths.clone());

    toolkit.create_group(FILE_GROUP, "View and edit text files", true);
    for tool in [
        Arc::new(ViewTextFileTool::new(guard.clone())) as Arc<dyn agentscope_core::Tool>,
        Arc::new(WriteTextFileTool::new(guard.clone())),
        Arc::new(InsertTextFileTool::new(guard.clone())),
    ] {
        // the group was just created
        let _ = toolkit.register_in_group(tool, FILE_GROUP);
    }

    toolkit.create_group(SHELL_GROUP, "Run shell commands", config.shell_enabled);
    let _ = toolkit.register_in_group(
        Arc::new(
            ShellCommandTool::new(
                config.allowed_commands.clone(),
                Duration::from_secs(config.shell_timeout_secs.max(1)),
            )
            .with_path_guard(guard.clone()),
        ),
        SHELL_GROUP,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_toolkit_respects_shell_switch() {
        let mut config = ToolsConfig::default();
        let toolkit = builtin_toolkit(&config);
        let names: Vec<_> = toolkit.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["view_text_file", "write_text_file", "insert_text_file", "execute_shell_command"]
        );

        config.shell_enabled = false;
        let toolkit = builtin_toolkit(&config);
        assert_eq!(toolkit.len(), 4);
        assert!(toolkit.schemas().iter().all(|s| s.name != "execute_shell_command"));
    }
}
