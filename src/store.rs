use crate::error::{MemoryError, Result};
use crate::evolution::{Reinforcement, ScorePolicy};
use crate::types::{Memory, MemoryNotification};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const FILE_VERSION: u32 = 1;

/// On-disk layout of the backing file. Read with raw records so one bad
/// entry cannot sink the rest.
#[derive(Serialize, Deserialize)]
struct StoreFile<M = Memory> {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    memories: Vec<M>,
}

/// Memory store backed by a single JSON file.
///
/// Readers grab an `Arc` of the current snapshot and never block writers for
/// longer than a pointer swap. Writers are serialized: copy the snapshot,
/// mutate the copy, publish it, then persist.
pub struct MemoryStore {
    path: PathBuf,
    snapshot: RwLock<Arc<Vec<Memory>>>,
    writer: Mutex<()>,
}

impl MemoryStore {
    /// Open the store at `path`. A missing or unreadable file is an empty store.
    ///
    /// A file that is not JSON at all is moved aside to `<name>.corrupt` so the
    /// first save cannot overwrite it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let memories = match read_file(&path) {
            Ok(memories) => memories,
            Err(MemoryError::Serialization(e)) => {
                let aside = corrupt_path(&path);
                match fs::rename(&path, &aside) {
                    Ok(()) => warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "backing file corrupt, moved aside and starting empty"
                    ),
                    Err(re) => warn!(
                        path = %path.display(),
                        error = %e,
                        rename_error = %re,
                        "backing file corrupt and could not be moved aside, starting empty"
                    ),
                }
                Vec::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "backing file unreadable, starting empty");
                Vec::new()
            }
        };

        info!(path = %path.display(), count = memories.len(), "memory store opened");
        Self {
            path,
            snapshot: RwLock::new(Arc::new(memories)),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consistent view of every memory in creation order
    pub fn snapshot(&self) -> Arc<Vec<Memory>> {
        Arc::clone(&self.snapshot.read())
    }

    /// Copy the snapshot, let `f` mutate it and report whether anything
    /// changed, then publish and persist.
    ///
    /// The new state is published before the write so a failed save leaves
    /// it queryable in-process; the save error is still returned.
    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Memory>) -> (T, bool)) -> Result<T> {
        let _writer = self.writer.lock();
        let mut next = Vec::clone(&self.snapshot.read());
        let (out, changed) = f(&mut next);
        if !changed {
            return Ok(out);
        }

        let next = Arc::new(next);
        *self.snapshot.write() = Arc::clone(&next);

        if let Err(e) = write_file(&self.path, &next) {
            warn!(path = %self.path.display(), error = %e, "failed to persist memories");
            return Err(e);
        }
        Ok(out)
    }

    /// Add a new memory
    pub fn insert(&self, memory: Memory) -> Result<()> {
        let id = memory.id.clone();
        self.mutate(|memories| {
            memories.push(memory);
            ((), true)
        })?;
        debug!(%id, "memory persisted");
        Ok(())
    }

    /// Delete a memory, returns false if it was not there
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.mutate(|memories| {
            let before = memories.len();
            memories.retain(|m| m.id != id);
            let removed = memories.len() != before;
            (removed, removed)
        })
    }

    /// Reinforce the given memories at `now`. Ids that vanished since the
    /// caller's snapshot are skipped. Returns how many were updated.
    pub fn reinforce(
        &self,
        updates: &[(String, Reinforcement)],
        policy: &ScorePolicy,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        self.mutate(|memories| {
            let targets: Vec<(usize, Reinforcement)> = {
                let positions: HashMap<&str, usize> = memories
                    .iter()
                    .enumerate()
                    .map(|(i, m)| (m.id.as_str(), i))
                    .collect();
                updates
                    .iter()
                    .filter_map(|(id, reason)| positions.get(id.as_str()).map(|i| (*i, *reason)))
                    .collect()
            };

            for (i, reason) in &targets {
                policy.reinforce(&mut memories[*i], *reason, now);
            }
            (targets.len(), !targets.is_empty())
        })
    }

    /// Replace in-memory state with the backing file.
    ///
    /// A missing file empties the store. A file that cannot be read or parsed
    /// leaves the current state untouched.
    pub fn reload(&self) -> Result<usize> {
        let _writer = self.writer.lock();
        let memories = read_file(&self.path)?;
        let count = memories.len();
        *self.snapshot.write() = Arc::new(memories);
        info!(count, "memories reloaded from disk");
        Ok(count)
    }

    /// Get a memory by ID
    pub fn get(&self, id: &str) -> Option<Memory> {
        self.snapshot().iter().find(|m| m.id == id).cloned()
    }

    /// Get memories carrying `tag`, newest first
    pub fn get_by_tag(&self, tag: &str, limit: usize) -> Vec<Memory> {
        let tag = tag.to_lowercase();
        self.snapshot()
            .iter()
            .rev()
            .filter(|m| m.tags.contains(&tag))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Get count of memories
    pub fn count(&self) -> usize {
        self.snapshot.read().len()
    }

    /// Get all unique tags with counts, most used first
    pub fn get_all_tags(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for memory in self.snapshot().iter() {
            for tag in &memory.tags {
                *counts.entry(tag.clone()).or_default() += 1;
            }
        }

        let mut tags: Vec<(String, usize)> = counts.into_iter().collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        tags
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Read the backing file. Missing means empty; records that fail to decode,
/// have blank content or repeat an id are dropped.
fn read_file(path: &Path) -> Result<Vec<Memory>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: StoreFile<serde_json::Value> = serde_json::from_str(&content)?;

    let mut seen = HashSet::new();
    let mut memories: Vec<Memory> = file
        .memories
        .into_iter()
        .enumerate()
        .filter_map(|(i, raw)| match serde_json::from_value::<Memory>(raw) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(record = i, error = %e, "skipping undecodable memory record");
                None
            }
        })
        .filter(|m| {
            let keep = !m.content.trim().is_empty() && seen.insert(m.id.clone());
            if !keep {
                warn!(id = %m.id, "skipping malformed memory record");
            }
            keep
        })
        .collect();

    memories.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
    Ok(memories)
}

/// Write the backing file via a sibling temp file and rename
fn write_file(path: &Path, memories: &[Memory]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = StoreFile {
        version: FILE_VERSION,
        memories: memories.to_vec(),
    };
    let json = serde_json::to_string_pretty(&file)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Queue of freshly added memories for realtime consumers.
///
/// Producers push; a consumer drains everything queued so far in one step.
#[derive(Default)]
pub struct NewMemoryQueue {
    pending: Mutex<Vec<MemoryNotification>>,
}

impl NewMemoryQueue {
    pub fn push(&self, notification: MemoryNotification) {
        self.pending.lock().push(notification);
    }

    /// Take everything queued, leaving the queue empty
    pub fn drain(&self) -> Vec<MemoryNotification> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Forget a queued notification whose memory was deleted before a drain
    pub fn discard(&self, id: &str) {
        self.pending.lock().retain(|n| n.id != id);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
