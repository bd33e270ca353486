//! Graph augmentation: a capped, soft ranking signal (§4.7 step 5).
//!
//! Only ever adds score to candidates that already have independent
//! lexical or vector evidence — a document reachable purely by graph
//! edges from the seed set is never surfaced on graph strength alone.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::models::GraphEdge;
use crate::store::Store;

pub struct GraphAugmentor<'a> {
    store: &'a Store,
}

#[derive(Debug, Clone, Copy)]
pub struct GraphTuning {
    pub seed_count: usize,
    pub time_budget: Duration,
    pub max_edges: usize,
    pub boost_weight: f64,
    pub absolute_cap: f64,
    pub relative_cap_fraction: f64,
    pub eligibility_similarity_floor: f64,
}

impl GraphTuning {
    pub fn typing() -> Self {
        Self {
            seed_count: 12,
            time_budget: Duration::from_millis(30),
            max_edges: 80,
            boost_weight: 0.16,
            absolute_cap: 0.06,
            relative_cap_fraction: 0.22,
            eligibility_similarity_floor: 0.32,
        }
    }

    pub fn deep() -> Self {
        Self {
            seed_count: 36,
            time_budget: Duration::from_millis(150),
            max_edges: 400,
            boost_weight: 0.16,
            absolute_cap: 0.10,
            relative_cap_fraction: 0.22,
            eligibility_similarity_floor: 0.26,
        }
    }
}

impl<'a> GraphAugmentor<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Sums `confidence * weight` across edges touching the seed set,
    /// per candidate document, time-budgeted and edge-capped.
    pub async fn score(&self, seeds: &[String], tuning: &GraphTuning) -> HashMap<String, f64> {
        let started = Instant::now();
        let seed_slice: Vec<String> = seeds.iter().take(tuning.seed_count).cloned().collect();

        let edges = match self.store.graph_neighbors(&seed_slice, tuning.max_edges).await {
            Ok(edges) => edges,
            Err(_) => return HashMap::new(),
        };

        let mut scores: HashMap<String, f64> = HashMap::new();
        let seed_set: std::collections::HashSet<&String> = seed_slice.iter().collect();
        for edge in &edges {
            if started.elapsed() > tuning.time_budget {
                break;
            }
            apply_edge(&mut scores, edge, &seed_set);
        }
        scores
    }

    /// The boost applied to a candidate's base score: capped by the
    /// absolute cap and by a fraction of the candidate's own base
    /// score, and only applied when the candidate is independently
    /// eligible (lexical match, or vector match above the floor).
    pub fn boost_for(
        graph_score: f64,
        base_score: f64,
        eligible: bool,
        tuning: &GraphTuning,
    ) -> f64 {
        if !eligible || graph_score <= 0.0 {
            return 0.0;
        }
        (graph_score * tuning.boost_weight)
            .min(tuning.absolute_cap)
            .min(base_score * tuning.relative_cap_fraction)
    }
}

fn apply_edge(scores: &mut HashMap<String, f64>, edge: &GraphEdge, seeds: &std::collections::HashSet<&String>) {
    let contribution = edge.confidence * edge.weight;
    if seeds.contains(&edge.source_node) && !seeds.contains(&edge.target_node) {
        *scores.entry(edge.target_node.clone()).or_insert(0.0) += contribution;
    }
    if seeds.contains(&edge.target_node) && !seeds.contains(&edge.source_node) {
        *scores.entry(edge.source_node.clone()).or_insert(0.0) += contribution;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_respects_absolute_cap() {
        let tuning = GraphTuning::typing();
        let boost = GraphAugmentor::boost_for(10.0, 1.0, true, &tuning);
        assert_eq!(boost, tuning.absolute_cap);
    }

    #[test]
    fn boost_respects_relative_cap() {
        let tuning = GraphTuning::typing();
        let boost = GraphAugmentor::boost_for(0.1, 0.1, true, &tuning);
        assert!(boost <= 0.1 * tuning.relative_cap_fraction + 1e-9);
    }

    #[test]
    fn ineligible_candidate_gets_no_boost() {
        let tuning = GraphTuning::typing();
        assert_eq!(GraphAugmentor::boost_for(5.0, 1.0, false, &tuning), 0.0);
    }

    #[test]
    fn zero_graph_score_gets_no_boost() {
        let tuning = GraphTuning::deep();
        assert_eq!(GraphAugmentor::boost_for(0.0, 1.0, true, &tuning), 0.0);
    }
}
