use crate::config::{find_moneta_path, MonetaConfig, DATA_DIR, DEFAULT_TOP_K, MEMORY_FILE};
use crate::error::{MemoryError, Result};
use crate::evolution::{Reinforcement, ScorePolicy};
use crate::graph::{connections, Connections, MemoryNetwork, SimilarityMatrix};
use crate::ranking;
use crate::similarity::{SimilarityEngine, SimilarityMethod};
use crate::store::{MemoryStore, NewMemoryQueue};
use crate::types::{Memory, MemoryNotification, MemoryStats, RankedResult};
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The main memory interface
pub struct Memories {
    data_path: PathBuf,
    store: MemoryStore,
    engine: SimilarityEngine,
    policy: ScorePolicy,
    min_relevance: f64,
    network_threshold: f64,
    new_memories: NewMemoryQueue,
}

impl Memories {
    /// Open an existing memory store
    pub fn open() -> Result<Self> {
        let data_path = find_moneta_path().ok_or_else(|| {
            MemoryError::NotInitialized(
                "No .moneta directory found. Run 'moneta init' first.".to_string(),
            )
        })?;
        Self::open_at(data_path)
    }

    /// Open a memory store at a specific path
    pub fn open_at(data_path: PathBuf) -> Result<Self> {
        if !data_path.exists() {
            return Err(MemoryError::NotInitialized(format!(
                "Path does not exist: {}",
                data_path.display()
            )));
        }

        let config = MonetaConfig::new(data_path.clone());
        let method = config
            .similarity_method()
            .parse::<SimilarityMethod>()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to tfidf");
                SimilarityMethod::TfIdf
            });

        let store = MemoryStore::open(data_path.join(MEMORY_FILE));
        let engine = SimilarityEngine::new(method, config.embedding_socket());

        Ok(Self {
            data_path,
            store,
            engine,
            policy: config.score_policy(),
            min_relevance: config.min_relevance(),
            network_threshold: config.network_threshold(),
            new_memories: NewMemoryQueue::default(),
        })
    }

    /// Initialize a new memory store
    pub fn init(path: &Path) -> Result<Self> {
        let data_path = path.join(DATA_DIR);
        fs::create_dir_all(&data_path)?;

        Self::open_at(data_path)
    }

    /// Get the data path
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn policy(&self) -> &ScorePolicy {
        &self.policy
    }

    pub fn min_relevance(&self) -> f64 {
        self.min_relevance
    }

    pub fn network_threshold(&self) -> f64 {
        self.network_threshold
    }

    // =========================================================================
    // Core operations
    // =========================================================================

    /// Remember something new. The memory is on disk and searchable when
    /// this returns.
    ///
    /// If only the save fails, the error is returned but the memory stays
    /// searchable in this process.
    pub fn add_memory(&self, content: &str, tags: &[String]) -> Result<Memory> {
        if content.trim().is_empty() {
            return Err(MemoryError::InvalidInput(
                "memory content cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let memory = Memory {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            tags: normalize_tags(tags),
            created: now,
            last_accessed: now,
            access_count: 0,
            score: 0.0,
        };

        self.store.insert(memory.clone())?;
        self.new_memories.push(MemoryNotification::from(&memory));
        info!(id = %memory.id, tags = ?memory.tags, "memory added");
        Ok(memory)
    }

    /// Rank memories against `query`, reinforcing every memory returned.
    ///
    /// An empty query browses all memories by score without reinforcing.
    /// Never fails: storage trouble while reinforcing is logged.
    pub fn search_memories(
        &self,
        query: &str,
        top_k: usize,
        min_relevance: f64,
    ) -> Vec<RankedResult> {
        if top_k == 0 {
            return Vec::new();
        }

        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            return Vec::new();
        }

        let now = Utc::now();
        let views: Vec<Memory> = snapshot
            .iter()
            .map(|m| self.policy.with_decay(m, now))
            .collect();

        if query.trim().is_empty() {
            return ranking::browse(&views, top_k);
        }

        let Some(relevances) = self.engine.relevance(query, &snapshot) else {
            debug!(query, "query has no usable terms");
            return Vec::new();
        };

        let results = ranking::rank(&views, &relevances, top_k, min_relevance);
        debug!(query, matched = results.len(), "search ranked");

        let updates: Vec<(String, Reinforcement)> = results
            .iter()
            .map(|r| {
                (
                    r.memory.id.clone(),
                    Reinforcement::Retrieval {
                        relevance: r.relevance_score,
                    },
                )
            })
            .collect();
        if let Err(e) = self.store.reinforce(&updates, &self.policy, now) {
            warn!(error = %e, "failed to persist search reinforcement");
        }

        results
    }

    /// All memories in creation order, scores decayed to now
    pub fn get_all_memories(&self) -> Vec<Memory> {
        let now = Utc::now();
        self.store
            .snapshot()
            .iter()
            .map(|m| self.policy.with_decay(m, now))
            .collect()
    }

    /// Get a specific memory
    pub fn get(&self, id: &str) -> Option<Memory> {
        self.store
            .get(id)
            .map(|m| self.policy.with_decay(&m, Utc::now()))
    }

    /// Recall memories by tag
    pub fn recall_by_tag(&self, tag: &str, limit: usize) -> Vec<Memory> {
        let now = Utc::now();
        self.store
            .get_by_tag(tag, limit)
            .iter()
            .map(|m| self.policy.with_decay(m, now))
            .collect()
    }

    /// Forget a memory. Returns false if there was nothing to forget.
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(id);
        self.engine.invalidate(id);
        self.new_memories.discard(id);

        let removed = removed?;
        if removed {
            info!(%id, "memory deleted");
        }
        Ok(removed)
    }

    /// Re-read the backing file, e.g. after an external edit. Failures are
    /// logged and the current state kept.
    pub fn reload_from_disk(&self) {
        match self.store.reload() {
            Ok(_) => self.engine.clear_cache(),
            Err(e) => warn!(path = %self.store.path().display(), error = %e, "reload failed, keeping current memories"),
        }
    }

    // =========================================================================
    // Network
    // =========================================================================

    /// Full pairwise similarity and the connections above `threshold`.
    /// `None` for an empty store.
    ///
    /// Memories with at least one connection are reinforced.
    pub fn calculate_all_scores_and_connections(
        &self,
        threshold: f64,
    ) -> Option<(Connections, SimilarityMatrix)> {
        let (_, graph, matrix) = self.scored_graph(threshold)?;
        Some((graph, matrix))
    }

    /// Nodes and edges for visualization; empty for an empty store
    pub fn memory_network(&self, threshold: f64) -> MemoryNetwork {
        match self.scored_graph(threshold) {
            Some((views, _, matrix)) => MemoryNetwork::build(&views, &matrix, threshold),
            None => MemoryNetwork::default(),
        }
    }

    fn scored_graph(&self, threshold: f64) -> Option<(Vec<Memory>, Connections, SimilarityMatrix)> {
        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            return None;
        }

        let now = Utc::now();
        let views: Vec<Memory> = snapshot
            .iter()
            .map(|m| self.policy.with_decay(m, now))
            .collect();
        let matrix = SimilarityMatrix::compute(&self.engine, &snapshot);
        let graph = connections(&matrix, threshold);

        let updates: Vec<(String, Reinforcement)> = graph
            .iter()
            .filter(|(_, neighbors)| !neighbors.is_empty())
            .map(|(id, neighbors)| {
                let similarity = neighbors.iter().map(|c| c.similarity).sum();
                (id.clone(), Reinforcement::Connection { similarity })
            })
            .collect();
        debug!(
            memories = snapshot.len(),
            connected = updates.len(),
            threshold,
            "network computed"
        );
        if let Err(e) = self.store.reinforce(&updates, &self.policy, now) {
            warn!(error = %e, "failed to persist connection reinforcement");
        }

        Some((views, graph, matrix))
    }

    // =========================================================================
    // Similarity method
    // =========================================================================

    pub fn available_methods(&self) -> Vec<&'static str> {
        SimilarityEngine::available_methods()
    }

    pub fn current_method(&self) -> SimilarityMethod {
        self.engine.current_method()
    }

    pub fn set_method(&self, name: &str) -> Result<SimilarityMethod> {
        self.engine.set_method(name)
    }

    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }

    // =========================================================================
    // Realtime + prompt context
    // =========================================================================

    /// Memories added since the last drain
    pub fn drain_new_memories(&self) -> Vec<MemoryNotification> {
        self.new_memories.drain()
    }

    /// Block of relevant memories for a chat prompt, or `None` when nothing
    /// clears the configured relevance floor
    pub fn prompt_context(&self, message: &str) -> Option<String> {
        if message.trim().is_empty() {
            return None;
        }

        let results = self.search_memories(message, DEFAULT_TOP_K, self.min_relevance);
        if results.is_empty() {
            return None;
        }

        let mut block = String::from("USER MEMORIES (for context):\n");
        for r in &results {
            block.push_str(&format!(
                "- {} (relevance: {:.2})\n",
                r.memory.content, r.relevance_score
            ));
        }
        block.push_str("\nUse these memories to personalize your response when relevant.");
        Some(block)
    }

    // =========================================================================
    // Stats and metadata
    // =========================================================================

    /// Get statistics
    pub fn stats(&self) -> MemoryStats {
        let memories = self.get_all_memories();
        let by_tag: HashMap<String, usize> = self.store.get_all_tags().into_iter().collect();

        let avg_score = if memories.is_empty() {
            0.0
        } else {
            memories.iter().map(|m| m.score).sum::<f64>() / memories.len() as f64
        };

        MemoryStats {
            total_memories: memories.len(),
            total_tags: by_tag.len(),
            by_tag,
            avg_score,
            total_accesses: memories.iter().map(|m| m.access_count).sum(),
        }
    }

    /// Get all tags with counts
    pub fn tags(&self) -> Vec<(String, usize)> {
        self.store.get_all_tags()
    }
}

/// Trim, lowercase and dedupe tags, keeping first-seen order
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Memories) {
        let dir = tempfile::tempdir().unwrap();
        let mem = Memories::init(dir.path()).unwrap();
        (dir, mem)
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![
            " Pref ".to_string(),
            "pref".to_string(),
            "".to_string(),
            "food".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["pref", "food"]);
    }

    #[test]
    fn test_add_rejects_blank_content() {
        let (_dir, mem) = open_temp();
        assert!(matches!(
            mem.add_memory("  \n", &[]),
            Err(MemoryError::InvalidInput(_))
        ));
        assert!(mem.get_all_memories().is_empty());
        assert!(mem.drain_new_memories().is_empty());
    }

    #[test]
    fn test_add_queues_notification() {
        let (_dir, mem) = open_temp();
        let added = mem.add_memory("I like tea", &["pref".to_string()]).unwrap();

        assert_eq!(added.score, 0.0);
        assert_eq!(added.access_count, 0);

        let queued = mem.drain_new_memories();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, added.id);
        assert!(mem.drain_new_memories().is_empty());
    }

    #[test]
    fn test_delete_drops_pending_notification() {
        let (_dir, mem) = open_temp();
        let added = mem.add_memory("I like tea", &[]).unwrap();
        assert!(mem.delete_memory(&added.id).unwrap());
        assert!(mem.drain_new_memories().is_empty());
    }

    #[test]
    fn test_top_k_zero_is_idempotent() {
        let (_dir, mem) = open_temp();
        mem.add_memory("I like tea", &[]).unwrap();

        let before = mem.get_all_memories();
        assert!(mem.search_memories("tea", 0, 0.0).is_empty());
        assert!(mem.search_memories("tea", 0, 0.0).is_empty());
        let after = mem.get_all_memories();

        assert_eq!(before[0].access_count, after[0].access_count);
        assert_eq!(before[0].last_accessed, after[0].last_accessed);
    }

    #[test]
    fn test_browse_mode_returns_everything_unreinforced() {
        let (_dir, mem) = open_temp();
        mem.add_memory("I like tea", &[]).unwrap();
        mem.add_memory("I drive a car", &[]).unwrap();

        let results = mem.search_memories("", 10, 0.9);
        assert_eq!(results.len(), 2);
        assert!(mem.get_all_memories().iter().all(|m| m.access_count == 0));
    }

    #[test]
    fn test_set_method_unknown_keeps_current() {
        let (_dir, mem) = open_temp();
        assert_eq!(mem.current_method(), SimilarityMethod::TfIdf);
        assert!(matches!(
            mem.set_method("bm25"),
            Err(MemoryError::UnknownMethod(_))
        ));
        assert_eq!(mem.current_method(), SimilarityMethod::TfIdf);
        assert_eq!(mem.available_methods(), vec!["tfidf", "lite", "server"]);
    }

    #[test]
    fn test_configured_method_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join(DATA_DIR);
        fs::create_dir_all(&data).unwrap();
        MonetaConfig::new(data.clone())
            .set_similarity_method("lite")
            .unwrap();

        let mem = Memories::open_at(data).unwrap();
        assert_eq!(mem.current_method(), SimilarityMethod::Lite);
    }

    #[test]
    fn test_prompt_context() {
        let (_dir, mem) = open_temp();
        mem.add_memory("I work as a nurse", &[]).unwrap();
        mem.add_memory("My favorite food is sushi", &[]).unwrap();

        let block = mem.prompt_context("Any tips for my work shifts?").unwrap();
        assert!(block.starts_with("USER MEMORIES (for context):"));
        assert!(block.contains("I work as a nurse"));
        assert!(!block.contains("sushi"));

        assert!(mem.prompt_context("").is_none());
        assert!(mem.prompt_context("quantum chromodynamics").is_none());
    }

    #[test]
    fn test_network_reinforces_connected_memories() {
        let (_dir, mem) = open_temp();
        let a = mem.add_memory("I like hiking trails", &[]).unwrap();
        let b = mem.add_memory("I enjoy hiking trails", &[]).unwrap();
        let c = mem.add_memory("My favorite food is sushi", &[]).unwrap();

        let network = mem.memory_network(0.3);
        assert_eq!(network.nodes.len(), 3);
        assert_eq!(network.edges.len(), 1);

        let after: HashMap<String, Memory> = mem
            .get_all_memories()
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        assert!(after[&a.id].score > 0.0);
        assert!(after[&b.id].score > 0.0);
        assert_eq!(after[&c.id].score, 0.0);
        assert_eq!(after[&a.id].access_count, 0);
    }

    #[test]
    fn test_stats() {
        let (_dir, mem) = open_temp();
        mem.add_memory("I like tea", &["pref".to_string()]).unwrap();
        mem.add_memory("I like coffee", &["pref".to_string(), "drink".to_string()])
            .unwrap();

        let stats = mem.stats();
        assert_eq!(stats.total_memories, 2);
        assert_eq!(stats.total_tags, 2);
        assert_eq!(stats.by_tag["pref"], 2);
    }
}
