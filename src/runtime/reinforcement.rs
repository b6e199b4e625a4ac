//! Reinforcement propagation.
//!
//! A recalled memory gains its (clamped) relevance; each ring of graph
//! neighbors around it gains 30% of the previous ring's amount, out to three
//! hops (100% / 30% / 9% / 2.7%).

use crate::domain::Memory;
use crate::runtime::graph::SimilarityGraph;
use crate::runtime::scoring::round2;
use std::collections::HashMap;
use tracing::debug;

/// Fraction carried from one ring to the next.
pub const HOP_DECAY: f64 = 0.3;

/// Number of neighbor rings that receive reinforcement.
pub const MAX_HOPS: usize = 3;

/// Accumulated reinforcement per memory id for one batch of recalls.
///
/// Contributions from different recalled memories add up; within one recalled
/// memory a node is credited only at its closest ring.
pub fn plan(
    memories: &[Memory],
    graph: &SimilarityGraph,
    recalled: &[(String, f32)],
) -> HashMap<String, f64> {
    let id_to_index: HashMap<&str, usize> = memories
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.as_str(), i))
        .collect();

    let mut totals: HashMap<String, f64> = HashMap::new();

    for (memory_id, relevance) in recalled {
        let Some(&origin) = id_to_index.get(memory_id.as_str()) else {
            debug!(memory_id = %memory_id, "Recalled memory no longer present, skipping");
            continue;
        };

        let base = f64::from(relevance.clamp(0.0, 1.0));
        *totals.entry(memory_id.clone()).or_insert(0.0) += base;

        let mut amount = base;
        for ring in graph.rings(origin, MAX_HOPS) {
            amount *= HOP_DECAY;
            for index in ring {
                *totals.entry(memories[index].id.clone()).or_insert(0.0) += amount;
            }
        }
    }

    totals
}

/// Add planned reinforcement to scores. Returns how many memories changed.
pub fn apply(memories: &mut [Memory], totals: &HashMap<String, f64>) -> usize {
    let mut touched = 0;
    for memory in memories.iter_mut() {
        if let Some(amount) = totals.get(&memory.id) {
            memory.score = round2((memory.score + amount).max(0.0));
            touched += 1;
        }
    }
    touched
}
