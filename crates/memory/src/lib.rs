//! Memory system implementations for AgentScope.
//!
//! - [`InMemoryMemory`]: short-term conversation memory with an optional window
//! - [`InMemoryLongTermMemory`] / [`VectorLongTermMemory`]: long-term memory
//! - [`SimpleKnowledge`] / [`KeywordKnowledge`]: knowledge bases for RAG
//! - [`TextReader`]: splits documents into chunks

pub mod in_memory;
pub mod knowledge;
pub mod long_term;
pub mod reader;
pub mod vector;

pub use in_memory::InMemoryMemory;
pub use knowledge::{keyword_score, KeywordKnowledge, SimpleKnowledge};
pub use long_term::{InMemoryLongTermMemory, VectorLongTermMemory};
pub use reader::TextReader;
pub use vector::{cosine_similarity, InMemoryVectorStore};
