//! Similarity Network View Models
//!
//! Node and edge shapes handed to the visualization layer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Edge Strength
// =============================================================================

/// Coarse bucket of an edge's similarity, used for coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStrength {
    /// Similarity above 0.6
    Strong,
    /// Similarity above 0.4
    Moderate,
    /// Anything that still cleared the threshold
    Weak,
}

impl EdgeStrength {
    pub fn classify(similarity: f32) -> Self {
        if similarity > 0.6 {
            Self::Strong
        } else if similarity > 0.4 {
            Self::Moderate
        } else {
            Self::Weak
        }
    }
}

// =============================================================================
// Nodes and Edges
// =============================================================================

/// A memory rendered as a graph node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkNode {
    /// Memory ID
    pub id: String,
    /// Content truncated to 50 characters
    pub label: String,
    /// Full content
    pub title: String,
    /// Current importance score
    pub score: f64,
    /// Creation date
    pub created: NaiveDate,
    /// Memory tags
    pub tags: Vec<String>,
    /// Display radius, grows with score and saturates at 100
    pub size: f64,
}

/// An undirected similarity edge between two memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub from: String,
    pub to: String,
    /// Cosine similarity
    pub value: f32,
    /// Similarity formatted with two decimals
    pub label: String,
    pub strength: EdgeStrength,
}

// =============================================================================
// Network View
// =============================================================================

/// Full graph payload for visualization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkView {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
    pub total_memories: usize,
    pub connections: usize,
}
