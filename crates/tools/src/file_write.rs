//! `write_text_file` and `insert_text_file` — create and edit text files.

use agentscope_core::error::ToolError;
use agentscope_core::tool::{Tool, ToolOutput};
use async_trait::async_trait;
use std::path::Path;

use crate::file_read::parse_range;
use crate::path_guard::PathGuard;

pub const WRITE_TOOL: &str = "write_text_file";
pub const INSERT_TOOL: &str = "insert_text_file";

fn string_arg<'a>(input: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    input[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a string")))
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

/// Write a file, or replace a line range of an existing one.
pub struct WriteTextFileTool {
    guard: PathGuard,
}

impl WriteTextFileTool {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }
}

impl Default for WriteTextFileTool {
    fn default() -> Self {
        Self::new(PathGuard::permissive())
    }
}

#[async_trait]
impl Tool for WriteTextFileTool {
    fn name(&self) -> &str {
        WRITE_TOOL
    }

    fn description(&self) -> &str {
        "Create or overwrite a text file. With 'ranges', replace only those lines of an existing file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path of the file to write" },
                "content": { "type": "string", "description": "The content to write" },
                "ranges": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "description": "Optional [start, end] line range (1-based, inclusive) to replace"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn call(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = string_arg(&input, "file_path")?;
        let content = string_arg(&input, "content")?;
        let range = parse_range(&input["ranges"])?;
        let resolved = self
            .guard
            .check(path)
            .map_err(|e| e.into_tool_error(WRITE_TOOL))?;

        let Some((start, end)) = range else {
            if let Err(e) = ensure_parent(&resolved).await {
                return Ok(ToolOutput::error(format!("Failed to create directory: {e}")));
            }
            return Ok(match tokio::fs::write(&resolved, content).await {
                Ok(()) => ToolOutput::text(format!("Wrote {} bytes to {path}", content.len())),
                Err(e) => ToolOutput::error(format!("Failed to write {path}: {e}")),
            });
        };

        let existing = match tokio::fs::read_to_string(&resolved).await {
            Ok(existing) => existing,
            Err(e) => return Ok(ToolOutput::error(format!("Failed to read {path}: {e}"))),
        };
        let mut lines: Vec<&str> = existing.lines().collect();
        if start > lines.len() {
            return Ok(ToolOutput::error(format!(
                "Line {start} is past the end of {path} ({} lines)",
                lines.len()
            )));
        }
        let end = end.unwrap_or(lines.len()).min(lines.len());
        lines.splice(start - 1..end, content.lines());

        let mut updated = lines.join("\n");
        if existing.ends_with('\n') {
            updated.push('\n');
        }
        Ok(match tokio::fs::write(&resolved, updated).await {
            Ok(()) => ToolOutput::text(format!("Replaced lines {start}-{end} of {path}")),
            Err(e) => ToolOutput::error(format!("Failed to write {path}: {e}")),
        })
    }
}

/// Insert text before a given line of an existing file.
pub struct InsertTextFileTool {
    guard: PathGuard,
}

impl InsertTextFileTool {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }
}

impl Default for InsertTextFileTool {
    fn default() -> Self {
        Self::new(PathGuard::permissive())
    }
}

#[async_trait]
impl Tool for InsertTextFileTool {
    fn name(&self) -> &str {
        INSERT_TOOL
    }

    fn description(&self) -> &str {
        "Insert content at a line of an existing text file. Line count + 1 appends."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path of the file" },
                "content": { "type": "string", "description": "The content to insert" },
                "line_number": {
                    "type": "integer",
                    "description": "1-based line the content is inserted before"
                }
            },
            "required": ["file_path", "content", "line_number"]
        })
    }

    async fn call(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = string_arg(&input, "file_path")?;
        let content = string_arg(&input, "content")?;
        let line_number = input["line_number"]
            .as_u64()
            .filter(|n| *n >= 1)
            .ok_or_else(|| ToolError::InvalidArguments("'line_number' must be >= 1".into()))?
            as usize;
        let resolved = self
            .guard
            .check(path)
            .map_err(|e| e.into_tool_error(INSERT_TOOL))?;

        let existing = match tokio::fs::read_to_string(&resolved).await {
            Ok(existing) => existing,
            Err(e) => return Ok(ToolOutput::error(format!("Failed to read {path}: {e}"))),
        };
        let mut lines: Vec<&str> = existing.lines().collect();
        if line_number > lines.len() + 1 {
            return Ok(ToolOutput::error(format!(
                "line_number {line_number} is out of range for {path} ({} lines)",
                lines.len()
            )));
        }
        let at = line_number - 1;
        lines.splice(at..at, content.lines());

        let mut updated = lines.join("\n");
        if existing.ends_with('\n') || existing.is_empty() {
            updated.push('\n');
        }
        Ok(match tokio::fs::write(&resolved, updated).await {
            Ok(()) => ToolOutput::text(format!("Inserted content at line {line_number} of {path}")),
            Err(e) => ToolOutput::error(format!("Failed to write {path}: {e}")),
        })
    }
}
