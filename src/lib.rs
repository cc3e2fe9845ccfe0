//! Moneta: a relevance-ranked memory of facts about the user.
//!
//! Memories are short texts persisted to a JSON file. Queries are scored
//! against every memory with a pluggable similarity method, merged with a
//! per-memory score that decays over time and grows with use, and returned as
//! a ranked list for prompt injection. The same similarity drives a pairwise
//! network for visualization.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod evolution;
pub mod graph;
pub mod memory;
pub mod ranking;
pub mod similarity;
pub mod store;
pub mod types;

pub use error::{MemoryError, Result};
pub use memory::Memories;
pub use types::{Memory, RankedResult};
