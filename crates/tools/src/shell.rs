//! Shell tool — execute system commands.
//!
//! Supports a command allowlist and a timeout. The exit code is always
//! reported back to the model.

use std::time::Duration;

use agentscope_core::error::ToolError;
use agentscope_core::tool::{Tool, ToolOutput};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::path_guard::{PathGuard, expand_tilde};

pub const SHELL_TOOL: &str = "execute_shell_command";

/// Characters that let a command run or read something its words do not
/// show: substitution, variables, redirection and escapes.
const SHELL_METACHARACTERS: &[char] = &['$', '`', '>', '<', '\\'];

/// Glob and brace characters, rejected inside path arguments.
const PATTERN_CHARACTERS: &[char] = &['*', '?', '[', '{'];

/// Execute shell commands with safety constraints.
pub struct ShellCommandTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    timeout: Duration,
    /// Path arguments must pass this guard.
    guard: Option<PathGuard>,
}

impl ShellCommandTool {
    pub fn new(allowed_commands: Vec<String>, timeout: Duration) -> Self {
        Self {
            allowed_commands,
            timeout,
            guard: None,
        }
    }

    pub fn with_path_guard(mut self, guard: PathGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Every command in a `;`, `&&`, `||` or `|` chain must be allowed.
    ///
    /// With an allowlist, substitution, variables, redirection and escapes
    /// are rejected outright, and every path argument must pass the guard.
    fn check_command(&self, command: &str) -> Result<(), String> {
        if self.allowed_commands.is_empty() {
            return Ok(());
        }
        if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(format!("'{c}' is not allowed in restricted commands"));
        }

        for segment in command.split(['|', ';', '&', '\n']).map(str::trim) {
            let mut words = segment.split_whitespace();
            let Some(base) = words.next() else {
                continue;
            };
            if !self.allowed_commands.iter().any(|a| a == base) {
                return Err(format!("command '{base}' is not in the allowlist"));
            }
            for word in words {
                self.check_argument(word)?;
            }
        }
        Ok(())
    }

    fn check_argument(&self, word: &str) -> Result<(), String> {
        let unquoted: String = word.chars().filter(|c| !matches!(*c, '\'' | '"')).collect();
        let value = match unquoted.split_once('=') {
            Some((_, value)) if unquoted.starts_with('-') => value,
            _ => unquoted.as_str(),
        };
        let path_like = value.contains('/') || value.starts_with('~') || value.starts_with('.');
        if !path_like {
            return Ok(());
        }
        if value.contains(PATTERN_CHARACTERS) {
            return Err(format!("patterns are not allowed in path '{value}'"));
        }
        match &self.guard {
            Some(guard) => guard
                .check(&expand_tilde(value))
                .map(|_| ())
                .map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }
}

fn format_output(code: i32, stdout: &str, stderr: &str) -> String {
    let mut out = format!("<returncode>{code}</returncode>");
    out.push_str(&format!("\n<stdout>{}</stdout>", stdout.trim_end()));
    out.push_str(&format!("\n<stderr>{}</stderr>", stderr.trim_end()));
    out
}

#[async_trait]
impl Tool for ShellCommandTool {
    fn name(&self) -> &str {
        SHELL_TOOL
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its return code, stdout and stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn call(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let command = input["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'command' must be a string".into()))?;

        if let Err(reason) = self.check_command(command) {
            warn!(command = %command, reason = %reason, "Shell command rejected");
            return Err(ToolError::PermissionDenied {
                tool_name: SHELL_TOOL.into(),
                reason,
            });
        }

        debug!(command = %command, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: SHELL_TOOL.into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: SHELL_TOOL.into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let code = output.status.code().unwrap_or(-1);
        let text = format_output(
            code,
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        );

        if output.status.success() {
            Ok(ToolOutput::text(text))
        } else {
            warn!(command = %command, exit_code = code, "Command failed");
            let mut out = ToolOutput::error(text);
            out.metadata.insert("exit_code".into(), code.into());
            Ok(out)
        }
    }
}
