//! `view_text_file` — read a text file, optionally a line range of it.

use agentscope_core::error::ToolError;
use agentscope_core::tool::{Tool, ToolOutput};
use async_trait::async_trait;

use crate::path_guard::PathGuard;

pub const VIEW_TOOL: &str = "view_text_file";

pub struct ViewTextFileTool {
    guard: PathGuard,
}

impl ViewTextFileTool {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }
}

impl Default for ViewTextFileTool {
    fn default() -> Self {
        Self::new(PathGuard::permissive())
    }
}

/// Parse `[start, end]` (1-based, inclusive). `end = -1` means the last line.
pub(crate) fn parse_range(value: &serde_json::Value) -> Result<Option<(usize, Option<usize>)>, ToolError> {
    if value.is_null() {
        return Ok(None);
    }
    let bad = || ToolError::InvalidArguments("'ranges' must be [start, end] with 1 <= start <= end".into());
    let arr = value.as_array().filter(|a| a.len() == 2).ok_or_else(bad)?;
    let start = arr[0].as_i64().filter(|s| *s >= 1).ok_or_else(bad)? as usize;
    let end = match arr[1].as_i64().ok_or_else(bad)? {
        -1 => None,
        e if e >= start as i64 => Some(e as usize),
        _ => return Err(bad()),
    };
    Ok(Some((start, end)))
}

/// Lines of `content` prefixed with their 1-based number.
fn numbered(content: &str, start: usize, end: Option<usize>) -> String {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(n, _)| *n >= start && end.is_none_or(|e| *n <= e))
        .map(|(n, line)| format!("{n}: {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for ViewTextFileTool {
    fn name(&self) -> &str {
        VIEW_TOOL
    }

    fn description(&self) -> &str {
        "View a text file with line numbers. Optionally restrict to a line range."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to view"
                },
                "ranges": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "description": "Optional [start, end] line range, 1-based and inclusive; end -1 reads to the last line"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn call(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = input["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'file_path' must be a string".into()))?;
        let range = parse_range(&input["ranges"])?;
        let resolved = self
            .guard
            .check(path)
            .map_err(|e| e.into_tool_error(VIEW_TOOL))?;

        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => content,
            Err(e) => return Ok(ToolOutput::error(format!("Failed to read {path}: {e}"))),
        };

        let total = content.lines().count();
        let text = match range {
            None => numbered(&content, 1, None),
            Some(_) if total == 0 => String::new(),
            Some((start, _)) if start > total => {
                return Ok(ToolOutput::error(format!(
                    "Line {start} is past the end of {path} ({total} lines)"
                )));
            }
            Some((start, end)) => numbered(&content, start, end),
        };
        Ok(ToolOutput::text(text))
    }
}
