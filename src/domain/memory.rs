use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored unit of free text plus metadata.
///
/// `id`, `content` and `created` never change after creation; `score` is
/// mutated only by the engine's scoring and reinforcement passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created: NaiveDate,
}

impl Memory {
    /// Create a fresh memory dated today with a zero score.
    pub fn new(content: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id: format!("mem_{}", Uuid::new_v4()),
            content: content.into(),
            score: 0.0,
            tags: dedupe_tags(tags),
            created: chrono::Local::now().date_naive(),
        }
    }

    /// Whitespace-delimited word count, used by the length heuristics.
    pub fn word_count(&self) -> usize {
        word_count(&self.content)
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// Tags are a set; keep first occurrence order so the stored form is stable.
fn dedupe_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// How a search was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Embedding similarity against the index.
    Semantic,
    /// Word-overlap fallback used while embeddings are unavailable.
    Keyword,
}

/// A single search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Cosine similarity (or keyword overlap in degraded mode).
    pub relevance_score: f32,
    /// The memory's score at the time it was ranked.
    pub importance_score: f64,
    /// `0.7 * relevance + 0.3 * importance / 100`.
    pub final_score: f64,
}

impl ScoredMemory {
    pub fn rank(memory: Memory, relevance_score: f32) -> Self {
        let importance_score = memory.score;
        Self {
            final_score: final_score(relevance_score, importance_score),
            memory,
            relevance_score,
            importance_score,
        }
    }
}

/// Hybrid ranking of relevance and accumulated importance.
pub fn final_score(relevance: f32, importance: f64) -> f64 {
    f64::from(relevance) * 0.7 + importance / 100.0 * 0.3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub mode: SearchMode,
    pub hits: Vec<ScoredMemory>,
}

impl SearchResults {
    pub fn is_degraded(&self) -> bool {
        self.mode == SearchMode::Keyword
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub total_connections: usize,
    pub average_score: f64,
    pub backend: String,
}

/// Top memories packed for a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmContext {
    pub memories: Vec<Memory>,
    pub total_score: f64,
}
