//! Pairwise similarity network over all memories.
//!
//! Every call recomputes the full N x N matrix, which is O(N^2) in both time
//! and memory. That is fine for hundreds to low thousands of memories; beyond
//! that the matrix should be cached and patched per add/delete instead.

use crate::similarity::{similarity, SimilarityEngine};
use crate::types::Memory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Symmetric pairwise similarities in snapshot order. The diagonal is zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatrix {
    ids: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    pub fn compute(engine: &SimilarityEngine, memories: &[Memory]) -> Self {
        let corpus = engine.vectorize_corpus(memories);
        let docs = corpus.documents();
        let n = docs.len();

        let mut values = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let sim = similarity(&docs[i], &docs[j]);
                values[i][j] = sim;
                values[j][i] = sim;
            }
        }

        Self {
            ids: memories.iter().map(|m| m.id.clone()).collect(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .unwrap_or(0.0)
    }

    /// Pairs `(i, j, similarity)` with `i < j` strictly above `threshold`
    pub fn pairs_above(&self, threshold: f64) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.len()).flat_map(move |i| {
            ((i + 1)..self.len()).filter_map(move |j| {
                let sim = self.values[i][j];
                (sim > threshold).then_some((i, j, sim))
            })
        })
    }
}

/// A neighbor in the connection graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    pub id: String,
    pub similarity: f64,
}

/// Memory id -> neighbors above the threshold. Every id has an entry and
/// every edge appears under both of its ends, neighbors in snapshot order.
pub type Connections = BTreeMap<String, Vec<Connection>>;

pub fn connections(matrix: &SimilarityMatrix, threshold: f64) -> Connections {
    let mut graph: Connections = matrix
        .ids()
        .iter()
        .map(|id| (id.clone(), Vec::new()))
        .collect();

    for (i, j, sim) in matrix.pairs_above(threshold) {
        let (a, b) = (&matrix.ids[i], &matrix.ids[j]);
        if let Some(neighbors) = graph.get_mut(a) {
            neighbors.push(Connection {
                id: b.clone(),
                similarity: sim,
            });
        }
        if let Some(neighbors) = graph.get_mut(b) {
            neighbors.push(Connection {
                id: a.clone(),
                similarity: sim,
            });
        }
    }

    graph
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkNode {
    pub id: String,
    pub label: String,
    pub score: f64,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkEdge {
    pub from: String,
    pub to: String,
    pub value: f64,
    pub width: f64,
    pub color: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Nodes and deduplicated edges for a graph renderer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryNetwork {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

impl MemoryNetwork {
    /// `memories` must be the snapshot `matrix` was computed from
    pub fn build(memories: &[Memory], matrix: &SimilarityMatrix, threshold: f64) -> Self {
        let nodes = memories
            .iter()
            .map(|m| NetworkNode {
                id: m.id.clone(),
                label: m.content.clone(),
                score: m.score,
                tags: m.tags.clone(),
                created: m.created,
                size: node_size(m.score),
            })
            .collect();

        let edges = matrix
            .pairs_above(threshold)
            .filter_map(|(i, j, sim)| {
                let (from, to) = (memories.get(i)?, memories.get(j)?);
                Some(NetworkEdge {
                    from: from.id.clone(),
                    to: to.id.clone(),
                    value: sim,
                    width: 2.0 + 12.0 * sim,
                    color: format!("rgba(168,85,247,{})", sim.min(1.0)),
                    kind: "semantic".to_string(),
                })
            })
            .collect();

        Self { nodes, edges }
    }
}

/// Node radius grows with score, capped at score 100
fn node_size(score: f64) -> f64 {
    20.0 + score.clamp(0.0, 100.0) * 0.5
}
