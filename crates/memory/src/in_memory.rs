//! In-memory short-term memory — the conversation history of one agent.

use agentscope_core::error::MemoryError;
use agentscope_core::memory::Memory;
use agentscope_core::{ContentBlock, Msg, MsgRole};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Stores messages in a Vec.
///
/// With a window set, the oldest non-system messages are dropped once the
/// limit is exceeded. Dropping a message that asked for tools also drops the
/// results answering it, so the history never holds an orphaned tool result.
pub struct InMemoryMemory {
    messages: Arc<RwLock<Vec<Msg>>>,
    max_messages: Option<usize>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
            max_messages: None,
        }
    }

    /// Keep at most `max` messages.
    pub fn with_window(max: usize) -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
            max_messages: Some(max.max(1)),
        }
    }
}

impl Default for InMemoryMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn tool_use_ids(msg: &Msg) -> HashSet<String> {
    msg.content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, .. } => Some(id.clone()),
            _ => None,
        })
        .collect()
}

fn enforce_window(messages: &mut Vec<Msg>, max: usize) {
    while messages.len() > max {
        let Some(idx) = messages.iter().position(|m| m.role != MsgRole::System) else {
            break;
        };
        let removed = messages.remove(idx);
        let ids = tool_use_ids(&removed);
        if ids.is_empty() {
            continue;
        }
        for msg in messages.iter_mut() {
            msg.content
                .retain(|b| !matches!(b, ContentBlock::ToolResult { id, .. } if ids.contains(id)));
        }
        messages.retain(|m| !m.content.is_empty());
    }
}

#[async_trait]
impl Memory for InMemoryMemory {
    async fn add(&self, msgs: Vec<Msg>) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;
        messages.extend(msgs);
        if let Some(max) = self.max_messages {
            let before = messages.len();
            enforce_window(&mut messages, max);
            if messages.len() < before {
                debug!(dropped = before - messages.len(), max, "Memory window trimmed");
            }
        }
        Ok(())
    }

    async fn get_memory(&self) -> Result<Vec<Msg>, MemoryError> {
        Ok(self.messages.read().await.clone())
    }

    async fn delete(&self, index: usize) -> Result<Msg, MemoryError> {
        let mut messages = self.messages.write().await;
        if index >= messages.len() {
            return Err(MemoryError::IndexOutOfRange {
                index,
                size: messages.len(),
            });
        }
        Ok(messages.remove(index))
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.messages.write().await.clear();
        Ok(())
    }

    async fn size(&self) -> Result<usize, MemoryError> {
        Ok(self.messages.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_round(id: &str) -> Vec<Msg> {
        vec![
            Msg::new(
                "bot",
                MsgRole::Assistant,
                vec![ContentBlock::tool_use(id, "shell", serde_json::json!({}))],
            ),
            Msg::new(
                "system",
                MsgRole::Tool,
                vec![ContentBlock::tool_result(id, "shell", vec![ContentBlock::text("ok")], false)],
            ),
        ]
    }

    #[tokio::test]
    async fn add_get_delete_clear() {
        let mem = InMemoryMemory::new();
        mem.add(vec![Msg::user("user", "one"), Msg::user("user", "two")])
            .await
            .unwrap();
        assert_eq!(mem.size().await.unwrap(), 2);

        let removed = mem.delete(0).await.unwrap();
        assert_eq!(removed.text_content(), "one");
        assert_eq!(mem.get_memory().await.unwrap()[0].text_content(), "two");

        mem.clear().await.unwrap();
        assert_eq!(mem.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_out_of_range() {
        let mem = InMemoryMemory::new();
        let err = mem.delete(3).await.unwrap_err();
        assert!(matches!(err, MemoryError::IndexOutOfRange { index: 3, size: 0 }));
    }

    #[tokio::test]
    async fn window_drops_oldest_but_keeps_system() {
        let mem = InMemoryMemory::with_window(3);
        mem.add(vec![Msg::system("rules")]).await.unwrap();
        for i in 0..4 {
            mem.add(vec![Msg::user("user", format!("m{i}"))]).await.unwrap();
        }
        let texts: Vec<_> = mem
            .get_memory()
            .await
            .unwrap()
            .iter()
            .map(|m| m.text_content())
            .collect();
        assert_eq!(texts, vec!["rules", "m2", "m3"]);
    }

    #[tokio::test]
    async fn window_never_orphans_tool_results() {
        let mem = InMemoryMemory::with_window(3);
        mem.add(vec![Msg::user("user", "list files")]).await.unwrap();
        mem.add(tool_round("c1")).await.unwrap();
        // 3 messages, at the limit
        mem.add(vec![Msg::assistant("bot", "done")]).await.unwrap();

        let msgs = mem.get_memory().await.unwrap();
        // user msg dropped first, still 3 left: tool use, tool result, reply
        assert_eq!(msgs.len(), 3);

        mem.add(vec![Msg::user("user", "thanks")]).await.unwrap();
        let msgs = mem.get_memory().await.unwrap();
        // the tool use went, and its result with it
        assert!(msgs.iter().all(|m| m.content_blocks_of("tool_result").is_empty()));
        let texts: Vec<_> = msgs.iter().map(|m| m.text_content()).collect();
        assert_eq!(texts, vec!["done", "thanks"]);
    }
}
