//! Knowledge bases for retrieval-augmented generation.

use std::collections::HashSet;
use std::sync::Arc;

use agentscope_core::error::MemoryError;
use agentscope_core::knowledge::{Document, Knowledge, RetrieveConfig};
use agentscope_core::model::EmbeddingModel;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::vector::InMemoryVectorStore;

/// Texts sent to the embedding model per request.
const EMBED_BATCH: usize = 10;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it", "of",
    "on", "or", "that", "the", "this", "to", "was", "what", "when", "where", "which", "who", "why",
    "with",
];

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Fraction of the query's terms that occur in `content`, in [0, 1].
///
/// Stopwords are ignored. A query made only of stopwords scores 0.
pub fn keyword_score(query: &str, content: &str) -> f32 {
    let query_terms = terms(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms = terms(content);
    let hits = query_terms.iter().filter(|t| content_terms.contains(*t)).count();
    hits as f32 / query_terms.len() as f32
}

/// Embedding-backed knowledge base.
///
/// Chunks are embedded on insert and retrieved by cosine similarity to the
/// embedded query.
pub struct SimpleKnowledge {
    embedder: Arc<dyn EmbeddingModel>,
    store: InMemoryVectorStore,
}

impl SimpleKnowledge {
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            embedder,
            store: InMemoryVectorStore::new(),
        }
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
        let vectors = self
            .embedder
            .embed(texts)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;
        if vectors.len() != texts.len() {
            return Err(MemoryError::EmbeddingFailed(format!(
                "{} returned {} vectors for {} texts",
                self.embedder.name(),
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Knowledge for SimpleKnowledge {
    async fn add_documents(&self, docs: Vec<Document>) -> Result<usize, MemoryError> {
        let mut stored = 0;
        let mut docs = docs.into_iter().peekable();
        while docs.peek().is_some() {
            let mut batch: Vec<Document> = docs.by_ref().take(EMBED_BATCH).collect();
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let vectors = self.embed(&texts).await?;
            for (doc, vector) in batch.iter_mut().zip(vectors) {
                doc.embedding = Some(vector);
            }
            stored += self.store.add(batch).await;
        }
        debug!(stored, embedder = self.embedder.name(), "Indexed knowledge documents");
        Ok(stored)
    }

    async fn retrieve(&self, query: &str, config: &RetrieveConfig) -> Result<Vec<Document>, MemoryError> {
        if query.trim().is_empty() || self.store.is_empty().await {
            return Ok(Vec::new());
        }
        let mut vectors = self.embed(&[query.to_string()]).await?;
        let Some(query_vec) = vectors.pop() else {
            return Ok(Vec::new());
        };
        Ok(self
            .store
            .search(&query_vec, config.limit, config.score_threshold)
            .await)
    }
}

/// Knowledge base scored by term overlap. Needs no embedding model.
#[derive(Default)]
pub struct KeywordKnowledge {
    docs: RwLock<Vec<Document>>,
}

impl KeywordKnowledge {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Knowledge for KeywordKnowledge {
    async fn add_documents(&self, docs: Vec<Document>) -> Result<usize, MemoryError> {
        let n = docs.len();
        self.docs.write().await.extend(docs);
        Ok(n)
    }

    async fn retrieve(&self, query: &str, config: &RetrieveConfig) -> Result<Vec<Document>, MemoryError> {
        let docs = self.docs.read().await;
        let mut results: Vec<Document> = docs
            .iter()
            .filter_map(|doc| {
                let score = keyword_score(query, &doc.content);
                (score > 0.0 && score >= config.score_threshold).then(|| {
                    let mut d = doc.clone();
                    d.score = score;
                    d
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(config.limit);
        Ok(results)
    }
}
