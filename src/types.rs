use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A memory entry
///
/// `score` is anchored at `last_accessed`: the stored value is what the score
/// was at that instant, and decay is applied lazily on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub score: f64,
}

/// Search result with relevance and combined score
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub memory: Memory,
    /// Raw text similarity, 0..1
    pub relevance_score: f64,
    /// Relevance merged with the decayed memory score
    pub final_score: f64,
}

/// Statistics about the memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub total_tags: usize,
    pub by_tag: HashMap<String, usize>,
    pub avg_score: f64,
    pub total_accesses: u64,
}

/// Payload queued for realtime consumers whenever a memory is added
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryNotification {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
}

impl From<&Memory> for MemoryNotification {
    fn from(memory: &Memory) -> Self {
        Self {
            id: memory.id.clone(),
            content: memory.content.clone(),
            score: memory.score,
            tags: memory.tags.clone(),
            created: memory.created,
        }
    }
}
