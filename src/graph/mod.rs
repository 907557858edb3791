//! Coupling graph over file paths.
//!
//! Undirected weighted graph built from three co-occurrence signals:
//! co-modifications, shared prompts, and burst co-edits. Proximity is a
//! bounded 2-hop walk, so the cyclic structure needs no cycle
//! detection, only symmetric adjacency maps.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Edges below this weight are omitted from the graph.
const MIN_EDGE_WEIGHT: f64 = 0.1;

/// Raw co-occurrence counts for one unordered file pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCounts {
    /// Files changed in the same commit or session.
    pub co_mods: u32,
    /// Files touched by the same chat reference.
    pub shared_prompts: u32,
    /// Files co-edited in the same burst.
    pub burst_co_edits: u32,
}

impl PairCounts {
    /// Edge weight: `min(1, co/5·0.4 + prompts/3·0.35 + bursts/4·0.25)`.
    #[must_use]
    pub fn weight(self) -> f64 {
        let w = f64::from(self.co_mods) / 5.0 * 0.4
            + f64::from(self.shared_prompts) / 3.0 * 0.35
            + f64::from(self.burst_co_edits) / 4.0 * 0.25;
        w.min(1.0)
    }
}

/// One materialized edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingEdge {
    /// First endpoint (lexically smaller path).
    pub a: String,
    /// Second endpoint.
    pub b: String,
    /// Edge weight in (0, 1].
    pub weight: f64,
    /// Raw counts behind the weight.
    pub counts: PairCounts,
}

/// Undirected weighted coupling graph.
#[derive(Debug, Clone, Default)]
pub struct CouplingGraph {
    /// Per-pair raw counts, keyed by ordered (a, b) with a < b.
    counts: BTreeMap<(String, String), PairCounts>,
    /// Symmetric adjacency: path → neighbor → weight.
    adjacency: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Builder accumulating co-occurrence signals.
#[derive(Debug, Clone, Default)]
pub struct CouplingGraphBuilder {
    counts: BTreeMap<(String, String), PairCounts>,
}

fn ordered_pair(a: &str, b: &str) -> Option<(String, String)> {
    match a.cmp(b) {
        std::cmp::Ordering::Less => Some((a.to_string(), b.to_string())),
        std::cmp::Ordering::Greater => Some((b.to_string(), a.to_string())),
        std::cmp::Ordering::Equal => None,
    }
}

impl CouplingGraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bump<F>(&mut self, files: &[String], update: F)
    where
        F: Fn(&mut PairCounts),
    {
        // Every unordered pair in the set contributes once.
        let unique: BTreeSet<&String> = files.iter().collect();
        let files: Vec<&String> = unique.into_iter().collect();
        for (i, a) in files.iter().enumerate() {
            for b in &files[i + 1..] {
                if let Some(key) = ordered_pair(a, b) {
                    update(self.counts.entry(key).or_default());
                }
            }
        }
    }

    /// Records files modified in the same commit or session.
    pub fn add_co_modification(&mut self, files: &[String]) {
        self.bump(files, |c| c.co_mods += 1);
    }

    /// Records files touched by the same chat reference.
    pub fn add_shared_prompt(&mut self, files: &[String]) {
        self.bump(files, |c| c.shared_prompts += 1);
    }

    /// Records files co-edited in the same burst.
    pub fn add_burst(&mut self, files: &[String]) {
        self.bump(files, |c| c.burst_co_edits += 1);
    }

    /// Materializes the graph, dropping sub-threshold edges.
    #[must_use]
    pub fn build(self) -> CouplingGraph {
        let mut adjacency: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        let mut kept: BTreeMap<(String, String), PairCounts> = BTreeMap::new();

        for ((a, b), counts) in self.counts {
            let weight = counts.weight();
            if weight < MIN_EDGE_WEIGHT {
                continue;
            }
            adjacency
                .entry(a.clone())
                .or_default()
                .insert(b.clone(), weight);
            adjacency
                .entry(b.clone())
                .or_default()
                .insert(a.clone(), weight);
            kept.insert((a, b), counts);
        }

        CouplingGraph {
            counts: kept,
            adjacency,
        }
    }
}

impl CouplingGraph {
    /// Returns all edges, ordered by endpoint pair.
    #[must_use]
    pub fn edges(&self) -> Vec<CouplingEdge> {
        self.counts
            .iter()
            .map(|((a, b), counts)| CouplingEdge {
                a: a.clone(),
                b: b.clone(),
                weight: counts.weight(),
                counts: *counts,
            })
            .collect()
    }

    /// Direct edge weight between two files, if the edge exists.
    #[must_use]
    pub fn edge_weight(&self, a: &str, b: &str) -> Option<f64> {
        self.adjacency.get(a).and_then(|n| n.get(b)).copied()
    }

    /// Neighbors of a file with their edge weights.
    #[must_use]
    pub fn neighbors(&self, file: &str) -> Vec<(&str, f64)> {
        self.adjacency
            .get(file)
            .map(|n| n.iter().map(|(k, w)| (k.as_str(), *w)).collect())
            .unwrap_or_default()
    }

    /// Weighted 2-hop proximity from `origin` to `target`.
    ///
    /// - identical paths: 1.0
    /// - direct neighbors: `0.5 · w(origin, target)`
    /// - 2-hop: `max over intermediaries of 0.33 · min(w(o, m), w(m, t))`
    /// - otherwise 0.0
    #[must_use]
    pub fn proximity(&self, origin: &str, target: &str) -> f64 {
        if origin == target {
            return 1.0;
        }

        if let Some(weight) = self.edge_weight(origin, target) {
            return 0.5 * weight;
        }

        let Some(origin_neighbors) = self.adjacency.get(origin) else {
            return 0.0;
        };
        let mut best = 0.0_f64;
        for (middle, w_om) in origin_neighbors {
            if let Some(w_mt) = self.edge_weight(middle, target) {
                best = best.max(0.33 * w_om.min(w_mt));
            }
        }
        best
    }

    /// Number of vertices with at least one edge.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.adjacency.len()
    }
}
