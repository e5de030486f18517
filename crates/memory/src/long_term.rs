//! Long-term memory — facts that outlive a single conversation.

use std::sync::Arc;

use agentscope_core::error::MemoryError;
use agentscope_core::knowledge::Document;
use agentscope_core::memory::{LongTermMemory, MemoryItem};
use agentscope_core::model::EmbeddingModel;
use agentscope_core::{Msg, MsgRole};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::knowledge::keyword_score;
use crate::vector::InMemoryVectorStore;

/// The recordable text of each message, `"name: text"`. System and tool
/// messages and empty texts are skipped.
fn recordable(msgs: &[Msg]) -> Vec<String> {
    msgs.iter()
        .filter(|m| matches!(m.role, MsgRole::User | MsgRole::Assistant))
        .filter_map(|m| {
            let text = m.text_content();
            let text = text.trim();
            (!text.is_empty()).then(|| format!("{}: {}", m.name, text))
        })
        .collect()
}

/// Keyword-scored long-term memory held in process.
#[derive(Default)]
pub struct InMemoryLongTermMemory {
    items: RwLock<Vec<MemoryItem>>,
}

impl InMemoryLongTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl LongTermMemory for InMemoryLongTermMemory {
    async fn record(&self, msgs: &[Msg]) -> Result<(), MemoryError> {
        let mut items = self.items.write().await;
        for content in recordable(msgs) {
            if items.iter().any(|i| i.content == content) {
                continue;
            }
            items.push(MemoryItem {
                id: Uuid::new_v4().to_string(),
                content,
                score: 0.0,
            });
        }
        Ok(())
    }

    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        let items = self.items.read().await;
        let mut results: Vec<MemoryItem> = items
            .iter()
            .filter_map(|item| {
                let score = keyword_score(query, &item.content);
                (score > 0.0).then(|| MemoryItem {
                    score,
                    ..item.clone()
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}

/// Long-term memory recalled by embedding similarity.
pub struct VectorLongTermMemory {
    embedder: Arc<dyn EmbeddingModel>,
    store: InMemoryVectorStore,
    min_score: f32,
}

impl VectorLongTermMemory {
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            embedder,
            store: InMemoryVectorStore::new(),
            min_score: 0.0,
        }
    }

    /// Drop recalled items scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }
}

#[async_trait]
impl LongTermMemory for VectorLongTermMemory {
    async fn record(&self, msgs: &[Msg]) -> Result<(), MemoryError> {
        let texts = recordable(msgs);
        if texts.is_empty() {
            return Ok(());
        }
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;
        let docs: Vec<Document> = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| {
                let mut doc = Document::new(text);
                doc.embedding = Some(vector);
                doc
            })
            .collect();
        let stored = self.store.add(docs).await;
        debug!(stored, "Recorded long-term memory");
        Ok(())
    }

    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        if query.trim().is_empty() || self.store.is_empty().await {
            return Ok(Vec::new());
        }
        let mut vectors = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;
        let Some(query_vec) = vectors.pop() else {
            return Err(MemoryError::EmbeddingFailed("no vector for query".into()));
        };
        Ok(self
            .store
            .search(&query_vec, limit, self.min_score)
            .await
            .into_iter()
            .map(|d| MemoryItem {
                id: d.id,
                content: d.content,
                score: d.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::tests::WordEmbedder;

    #[tokio::test]
    async fn records_user_and_assistant_text_once() {
        let ltm = InMemoryLongTermMemory::new();
        let msgs = vec![
            Msg::system("be nice"),
            Msg::user("alice", "My favourite colour is green"),
            Msg::assistant("Friday", "Noted, green it is"),
        ];
        ltm.record(&msgs).await.unwrap();
        ltm.record(&msgs).await.unwrap();
        assert_eq!(ltm.len().await, 2);

        let hits = ltm.retrieve("favourite colour", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "alice: My favourite colour is green");
        assert_eq!(hits[0].score, 1.0);
    }

    #[tokio::test]
    async fn unrelated_query_recalls_nothing() {
        let ltm = InMemoryLongTermMemory::new();
        ltm.record(&[Msg::user("alice", "I live in Paris")]).await.unwrap();
        assert!(ltm.retrieve("weather tomorrow", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vector_memory_recalls_closest() {
        let ltm = VectorLongTermMemory::new(Arc::new(WordEmbedder::new(vec!["paris", "green", "rust"])))
            .with_min_score(0.5);
        ltm.record(&[
            Msg::user("alice", "I live in Paris"),
            Msg::user("alice", "I write Rust"),
        ])
        .await
        .unwrap();

        let hits = ltm.retrieve("where is paris", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("Paris"));
    }
}
