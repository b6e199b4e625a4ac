use crate::domain::{Memory, ScoredMemory};
use crate::runtime::embedding::tokenize;
use std::collections::HashSet;

/// Word-overlap relevance in `[0, 1]`, used when embeddings are unavailable.
///
/// Fraction of query words present in the content, plus 0.5 when the whole
/// query appears verbatim and 0.1 per query word found as a substring.
pub fn keyword_relevance(query: &str, content: &str) -> f32 {
    let lower_query = query.trim().to_lowercase();
    let query_words: HashSet<String> = tokenize(&lower_query).collect();
    if query_words.is_empty() {
        return 0.0;
    }

    let lower_content = content.to_lowercase();
    let content_words: HashSet<String> = tokenize(&lower_content).collect();

    let common = query_words.intersection(&content_words).count();
    let mut score = common as f32 / query_words.len() as f32;

    if lower_content.contains(&lower_query) {
        score += 0.5;
    }
    for word in &query_words {
        if lower_content.contains(word.as_str()) {
            score += 0.1;
        }
    }

    score.min(1.0)
}

/// Rank memories by keyword relevance with the same hybrid final score as
/// semantic search.
pub fn keyword_search(
    memories: &[Memory],
    query: &str,
    top_k: usize,
    min_relevance: f32,
) -> Vec<ScoredMemory> {
    let mut hits: Vec<ScoredMemory> = memories
        .iter()
        .filter_map(|memory| {
            let relevance = keyword_relevance(query, &memory.content);
            (relevance > 0.0 && relevance >= min_relevance)
                .then(|| ScoredMemory::rank(memory.clone(), relevance))
        })
        .collect();

    hits.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(top_k);
    hits
}
