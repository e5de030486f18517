//! Vector similarity and an in-process vector store.

use agentscope_core::Document;
use tokio::sync::RwLock;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ, either vector is empty or has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Documents with embeddings, searched by brute-force cosine similarity.
#[derive(Default)]
pub struct InMemoryVectorStore {
    docs: RwLock<Vec<Document>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store documents. Those without an embedding are skipped.
    pub async fn add(&self, docs: Vec<Document>) -> usize {
        let mut store = self.docs.write().await;
        let before = store.len();
        store.extend(docs.into_iter().filter(|d| d.embedding.is_some()));
        store.len() - before
    }

    /// Best matches first, `score` set to the similarity.
    pub async fn search(&self, query: &[f32], limit: usize, min_score: f32) -> Vec<Document> {
        let store = self.docs.read().await;
        let mut scored: Vec<Document> = store
            .iter()
            .filter_map(|doc| {
                let emb = doc.embedding.as_ref()?;
                let sim = cosine_similarity(emb, query);
                (sim >= min_score).then(|| {
                    let mut d = doc.clone();
                    d.score = sim;
                    d
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.docs.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str, embedding: Vec<f32>) -> Document {
        let mut d = Document::new(content);
        d.embedding = Some(embedding);
        d
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors() {
        let sim = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn search_ranks_and_filters() {
        let store = InMemoryVectorStore::new();
        let added = store
            .add(vec![
                doc("north", vec![1.0, 0.0]),
                doc("north-east", vec![1.0, 1.0]),
                doc("east", vec![0.0, 1.0]),
                Document::new("no embedding"),
            ])
            .await;
        assert_eq!(added, 3);

        let hits = store.search(&[1.0, 0.0], 10, 0.5).await;
        let names: Vec<_> = hits.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(names, vec!["north", "north-east"]);
        assert!(hits[0].score > hits[1].score);

        let top = store.search(&[1.0, 0.0], 1, 0.0).await;
        assert_eq!(top.len(), 1);
    }
}
