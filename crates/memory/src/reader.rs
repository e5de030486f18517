//! Document reader — splits text into overlapping chunks for indexing.

use std::path::Path;

use agentscope_core::error::MemoryError;
use agentscope_core::knowledge::Document;

/// Splits text into chunks of at most `chunk_size` characters.
///
/// Consecutive chunks share `overlap` characters. A chunk ends at a paragraph
/// break, failing that at a sentence end or whitespace, as long as the break
/// falls in the second half of the window.
#[derive(Debug, Clone)]
pub struct TextReader {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextReader {
    fn default() -> Self {
        Self::new(512, 64)
    }
}

impl TextReader {
    /// `overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let hard_end = (start + self.chunk_size).min(chars.len());
            let end = if hard_end == chars.len() {
                hard_end
            } else {
                self.break_point(&chars[start..hard_end])
                    .map(|offset| start + offset)
                    .unwrap_or(hard_end)
            };

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end == chars.len() {
                break;
            }
            let next = end.saturating_sub(self.overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Offset just past the best break in `window`, if one lies in its
    /// second half.
    fn break_point(&self, window: &[char]) -> Option<usize> {
        let min = window.len() / 2;
        let last = |pred: &dyn Fn(usize) -> bool| (min..window.len()).rev().find(|&i| pred(i));

        last(&|i| i + 1 < window.len() && window[i] == '\n' && window[i + 1] == '\n')
            .map(|i| i + 2)
            .or_else(|| {
                last(&|i| {
                    matches!(window[i], '.' | '!' | '?' | '。' | '！' | '？')
                        && window.get(i + 1).is_none_or(|c| c.is_whitespace())
                })
                .map(|i| i + 1)
            })
            .or_else(|| last(&|i| window[i].is_whitespace()).map(|i| i + 1))
    }

    /// Chunk `text` into documents tagged with `source` and their position.
    pub fn read_str(&self, text: &str, source: &str) -> Vec<Document> {
        self.chunk(text)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut doc = Document::new(chunk).with_source(source);
                doc.metadata.insert("chunk".into(), serde_json::json!(i));
                doc
            })
            .collect()
    }

    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<Vec<Document>, MemoryError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to read {}: {e}", path.display())))?;
        Ok(self.read_str(&text, &path.display().to_string()))
    }
}
