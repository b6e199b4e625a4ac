//! Similarity Graph Builder
//!
//! Builds an undirected weighted graph over memories from their embeddings.
//! An edge exists only if the pair's cosine similarity clears a threshold that
//! is raised for short texts, since terse memories produce misleadingly high
//! similarity. Uses petgraph for the graph representation.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashSet;

/// Default base similarity threshold for connections.
pub const DEFAULT_BASE_THRESHOLD: f32 = 0.35;

/// Base threshold used for the visualization network.
pub const NETWORK_THRESHOLD: f32 = 0.4;

// =============================================================================
// Inputs
// =============================================================================

/// One memory as seen by the graph builder.
#[derive(Debug, Clone, Copy)]
pub struct GraphInput<'a> {
    /// Whitespace word count of the memory content
    pub words: usize,
    /// Embedding vector (any norm)
    pub vector: &'a [f32],
}

/// Similarity required for a pair whose shorter text has `min_words` words.
pub fn required_similarity(base_threshold: f32, min_words: usize) -> f32 {
    if min_words <= 3 {
        (base_threshold + 0.15).max(0.6)
    } else if min_words <= 5 {
        base_threshold + 0.1
    } else {
        base_threshold
    }
}

// =============================================================================
// Similarity Matrix
// =============================================================================

/// Dense symmetric N×N cosine similarity matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    n: usize,
    values: Vec<f32>,
}

impl SimilarityMatrix {
    fn from_normalized(rows: &[Vec<f32>]) -> Self {
        let n = rows.len();
        let mut values = vec![0.0_f32; n * n];
        for i in 0..n {
            for j in i..n {
                let dot: f32 = rows[i].iter().zip(&rows[j]).map(|(a, b)| a * b).sum();
                values[i * n + j] = dot;
                values[j * n + i] = dot;
            }
        }
        Self { n, values }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.values[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.values[i * self.n..(i + 1) * self.n]
    }
}

fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

// =============================================================================
// Similarity Graph
// =============================================================================

/// Transient similarity view over the current memory set. Node weights are
/// positions in the memory list the graph was built from.
#[derive(Debug, Clone)]
pub struct SimilarityGraph {
    graph: UnGraph<usize, f32>,
    matrix: SimilarityMatrix,
    base_threshold: f32,
}

impl SimilarityGraph {
    /// Build the graph. Returns `None` when there are no memories.
    pub fn build(inputs: &[GraphInput<'_>], base_threshold: f32) -> Option<Self> {
        if inputs.is_empty() {
            return None;
        }

        let normalized: Vec<Vec<f32>> = inputs.iter().map(|m| l2_normalize(m.vector)).collect();
        let matrix = SimilarityMatrix::from_normalized(&normalized);

        let mut graph = UnGraph::with_capacity(inputs.len(), 0);
        for i in 0..inputs.len() {
            graph.add_node(i);
        }

        for i in 0..inputs.len() {
            for j in (i + 1)..inputs.len() {
                let sim = matrix.get(i, j);
                let min_words = inputs[i].words.min(inputs[j].words);
                if sim >= required_similarity(base_threshold, min_words) {
                    graph.add_edge(NodeIndex::new(i), NodeIndex::new(j), sim);
                }
            }
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            base_threshold,
            "Similarity graph built"
        );

        Some(Self {
            graph,
            matrix,
            base_threshold,
        })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn base_threshold(&self) -> f32 {
        self.base_threshold
    }

    pub fn matrix(&self) -> &SimilarityMatrix {
        &self.matrix
    }

    /// Neighbors of `i` with edge similarity, ascending by index.
    pub fn neighbors(&self, i: usize) -> Vec<(usize, f32)> {
        let node = NodeIndex::new(i);
        let mut out: Vec<(usize, f32)> = self
            .graph
            .edges(node)
            .map(|e| {
                let other = if e.source() == node {
                    e.target()
                } else {
                    e.source()
                };
                (other.index(), *e.weight())
            })
            .collect();
        out.sort_by_key(|(j, _)| *j);
        out
    }

    pub fn degree(&self, i: usize) -> usize {
        self.graph.edges(NodeIndex::new(i)).count()
    }

    /// Adjacency list form: `connections[i] = [(j, sim), ...]`.
    pub fn connections(&self) -> Vec<Vec<(usize, f32)>> {
        (0..self.len()).map(|i| self.neighbors(i)).collect()
    }

    /// Every edge once as `(i, j, sim)` with `i < j`, in build order.
    pub fn edges(&self) -> Vec<(usize, usize, f32)> {
        let mut edges: Vec<(usize, usize, f32)> = self
            .graph
            .edge_references()
            .map(|e| {
                let (a, b) = (e.source().index(), e.target().index());
                (a.min(b), a.max(b), *e.weight())
            })
            .collect();
        edges.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        edges
    }

    /// Breadth-first rings around `origin`: `rings[0]` holds the direct
    /// neighbors, `rings[1]` the nodes two hops away, and so on. A node appears
    /// only in the ring closest to `origin`, and never the origin itself.
    pub fn rings(&self, origin: usize, depth: usize) -> Vec<Vec<usize>> {
        let mut visited: HashSet<usize> = HashSet::from([origin]);
        let mut frontier = vec![origin];
        let mut rings = Vec::with_capacity(depth);

        for _ in 0..depth {
            let mut next = Vec::new();
            for &node in &frontier {
                for (neighbor, _) in self.neighbors(node) {
                    if visited.insert(neighbor) {
                        next.push(neighbor);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            next.sort_unstable();
            rings.push(next.clone());
            frontier = next;
        }
        rings
    }
}

// =============================================================================
// Tests
// =============================================================================
