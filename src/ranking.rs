//! Merge text relevance with evolved memory scores into one ordering.
//!
//! `final_score = RELEVANCE_WEIGHT * relevance + SCORE_WEIGHT * ln(1 + score)`
//!
//! The log keeps a heavily reinforced memory from drowning out relevance while
//! leaving the final score unbounded.

use crate::types::{Memory, RankedResult};
use std::cmp::Ordering;

/// Weight of raw text relevance in the final score
pub const RELEVANCE_WEIGHT: f64 = 0.7;

/// Weight of the log-scaled memory score in the final score
pub const SCORE_WEIGHT: f64 = 0.3;

pub fn normalized_score(score: f64) -> f64 {
    if score.is_finite() && score > 0.0 {
        score.ln_1p()
    } else {
        0.0
    }
}

pub fn final_score(relevance: f64, score: f64) -> f64 {
    RELEVANCE_WEIGHT * relevance + SCORE_WEIGHT * normalized_score(score)
}

/// Final score desc, relevance desc, oldest first, then id
fn compare(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.final_score
        .total_cmp(&a.final_score)
        .then_with(|| b.relevance_score.total_cmp(&a.relevance_score))
        .then_with(|| a.memory.created.cmp(&b.memory.created))
        .then_with(|| a.memory.id.cmp(&b.memory.id))
}

/// Rank `memories` (scores already decayed) by their paired `relevances`,
/// dropping anything under `min_relevance` and keeping the best `top_k`.
pub fn rank(
    memories: &[Memory],
    relevances: &[f64],
    top_k: usize,
    min_relevance: f64,
) -> Vec<RankedResult> {
    if top_k == 0 {
        return Vec::new();
    }

    let mut results: Vec<RankedResult> = memories
        .iter()
        .zip(relevances)
        .filter(|(_, relevance)| relevance.is_finite() && **relevance >= min_relevance)
        .map(|(memory, relevance)| RankedResult {
            memory: memory.clone(),
            relevance_score: *relevance,
            final_score: final_score(*relevance, memory.score),
        })
        .collect();

    results.sort_by(compare);
    results.truncate(top_k);
    results
}

/// Every memory ordered by score alone, for an empty query
pub fn browse(memories: &[Memory], top_k: usize) -> Vec<RankedResult> {
    let relevances = vec![0.0; memories.len()];
    rank(memories, &relevances, top_k, f64::NEG_INFINITY)
}
