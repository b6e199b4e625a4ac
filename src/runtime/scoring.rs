//! Importance scoring from similarity-graph structure.

use crate::domain::Memory;
use crate::runtime::graph::SimilarityGraph;

/// Connection weight: strong links count for more than their raw similarity.
pub fn connection_weight(similarity: f32) -> f64 {
    if similarity >= 0.7 {
        3.0
    } else if similarity >= 0.5 {
        2.0
    } else {
        1.0
    }
}

/// Bonus for longer, more detailed memories.
pub fn content_bonus(words: usize) -> f64 {
    if words >= 10 {
        0.2
    } else if words >= 5 {
        0.1
    } else {
        0.0
    }
}

/// Structural score of node `i`: weighted connection strength, hub bonus and
/// content-length bonus.
pub fn structural_score(graph: &SimilarityGraph, i: usize, words: usize) -> f64 {
    let neighbors = graph.neighbors(i);
    let mut base: f64 = neighbors
        .iter()
        .map(|&(_, sim)| f64::from(sim) * connection_weight(sim))
        .sum();

    if neighbors.len() >= 3 {
        base += neighbors.len() as f64 * 0.1;
    }

    base + content_bonus(words)
}

/// Blend of a fresh structural score with what the memory already accrued.
///
/// With `preserve_existing` the reinforcement history survives routine
/// rescoring; without it the score is reset to the structural value.
pub fn blend(existing: f64, base: f64, preserve_existing: bool) -> f64 {
    let score = if preserve_existing {
        existing.max(base * 0.5) + base * 0.3
    } else {
        base
    };
    round2(score.max(0.0))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Recompute every memory's score in place. `memories[i]` must be node `i` of
/// `graph`.
pub fn score_all(memories: &mut [Memory], graph: &SimilarityGraph, preserve_existing: bool) {
    debug_assert_eq!(memories.len(), graph.len());
    for (i, memory) in memories.iter_mut().enumerate() {
        let base = structural_score(graph, i, memory.word_count());
        memory.score = blend(memory.score, base, preserve_existing);
    }
}
