//! Integration tests for the memory engine.
//!
//! These run the full add / search / reinforce / persist cycle against a JSON
//! file in a temp directory, using the hashed embedder so no model download
//! is needed.

use async_trait::async_trait;
use memory_network::domain::memory::final_score;
use memory_network::domain::{Memory, SearchMode};
use memory_network::error::{EmbeddingError, MemoryError};
use memory_network::persistence::MemoryRepository;
use memory_network::persistence::providers::JsonFileRepository;
use memory_network::runtime::{EmbeddingProvider, EngineSettings, HashedEmbedder, MemoryEngine};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

/// Embedding provider that always fails, forcing degraded mode.
#[derive(Debug)]
struct OfflineEmbedder;

#[async_trait]
impl EmbeddingProvider for OfflineEmbedder {
    async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::ModelLoad("model not downloaded".to_string()))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

async fn open_engine(path: &Path) -> MemoryEngine {
    open_with(path, Arc::new(HashedEmbedder::default())).await
}

async fn open_with(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> MemoryEngine {
    let repository = Arc::new(JsonFileRepository::new(path));
    MemoryEngine::open(repository, embedder, EngineSettings::default())
        .await
        .expect("Failed to open engine")
}

fn store_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("memories.json")
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn test_search_finds_related_memory() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    engine
        .add_memory("I love pepperoni pizza", vec!["food".into()])
        .await
        .unwrap();
    engine
        .add_memory("pepperoni pizza is my favorite dinner", vec![])
        .await
        .unwrap();
    engine
        .add_memory("The weather is sunny today", vec![])
        .await
        .unwrap();

    let results = engine
        .search_memories("pepperoni pizza", 10, 0.35)
        .await
        .unwrap();

    assert_eq!(results.mode, SearchMode::Semantic);
    assert!(!results.is_degraded());
    assert_eq!(results.hits.len(), 2);
    for hit in &results.hits {
        assert!(hit.memory.content.contains("pepperoni"));
        assert!(hit.relevance_score > 0.35);
    }
}

#[tokio::test]
async fn test_python_query_matches_only_python_memory() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    let python = engine
        .add_memory("I love Python for data analysis", vec![])
        .await
        .unwrap();
    engine
        .add_memory("Machine learning uses neural networks", vec![])
        .await
        .unwrap();

    let results = engine.search_memories("python", 10, 0.2).await.unwrap();

    assert_eq!(results.mode, SearchMode::Semantic);
    assert_eq!(results.hits.len(), 1);
    let hit = &results.hits[0];
    assert_eq!(hit.memory.id, python.id);
    assert!(hit.relevance_score > 0.2);
    let expected = 0.7 * f64::from(hit.relevance_score) + 0.3 * hit.importance_score / 100.0;
    assert!((hit.final_score - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_hits_ordered_by_final_score() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    for content in [
        "I write Python scripts every day at work",
        "Python is my favorite programming language",
        "I enjoy hiking in the mountains on weekends",
        "My python project uses async code",
    ] {
        engine.add_memory(content, vec![]).await.unwrap();
    }

    let results = engine.search_memories("python", 3, 0.05).await.unwrap();
    assert!(!results.hits.is_empty());
    assert!(results.hits.len() <= 3);

    for hit in &results.hits {
        let expected = final_score(hit.relevance_score, hit.importance_score);
        assert!((hit.final_score - expected).abs() < 1e-9);
    }
    for pair in results.hits.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
}

#[tokio::test]
async fn test_search_reinforces_recalled_memory() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    let target = engine
        .add_memory("my cat is named Whiskers", vec![])
        .await
        .unwrap();
    engine
        .add_memory("I drive a blue bicycle to work", vec![])
        .await
        .unwrap();

    let before = engine.get_memory(&target.id).await.unwrap().score;
    let results = engine
        .search_memories("cat named Whiskers", 5, 0.3)
        .await
        .unwrap();
    assert_eq!(results.hits[0].memory.id, target.id);

    let after = engine.get_memory(&target.id).await.unwrap().score;
    assert!(after > before, "score should grow: {before} -> {after}");
}

#[tokio::test]
async fn test_reinforce_never_decreases_scores() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    let a = engine.add_memory("coffee every morning", vec![]).await.unwrap();
    engine.add_memory("coffee with milk in the morning", vec![]).await.unwrap();
    engine.add_memory("tea in the afternoon", vec![]).await.unwrap();

    let before: Vec<Memory> = engine.get_all_memories(None).await;
    let touched = engine
        .reinforce(&[(a.id.clone(), 0.9), ("mem_missing".to_string(), 1.0)])
        .await
        .unwrap();
    assert!(touched >= 1);

    for memory in before {
        let now = engine.get_memory(&memory.id).await.unwrap();
        assert!(now.score >= memory.score);
    }
}

#[tokio::test]
async fn test_blank_query_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    let err = engine.search_memories("   ", 5, 0.2).await.unwrap_err();
    assert!(matches!(err, MemoryError::Validation(_)));
}

#[tokio::test]
async fn test_empty_store_search_returns_nothing() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    let results = engine.search_memories("anything", 5, 0.0).await.unwrap();
    assert!(results.hits.is_empty());
}

// =============================================================================
// Store Operations
// =============================================================================

#[tokio::test]
async fn test_empty_content_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    let err = engine.add_memory("  \n ", vec![]).await.unwrap_err();
    assert!(matches!(err, MemoryError::Validation(_)));
    assert!(engine.is_empty().await);
}

#[tokio::test]
async fn test_delete_removes_memory_and_its_edges() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    let a = engine
        .add_memory("rust ownership and borrowing rules", vec![])
        .await
        .unwrap();
    engine
        .add_memory("rust ownership and borrowing explained", vec![])
        .await
        .unwrap();
    engine
        .add_memory("ownership and borrowing in rust code", vec![])
        .await
        .unwrap();

    let network = engine.network(Some(0.3)).await;
    assert!(network.edges.iter().any(|e| e.from == a.id || e.to == a.id));

    assert!(engine.delete_memory(&a.id).await.unwrap());
    assert!(engine.get_memory(&a.id).await.is_none());
    assert!(!engine.delete_memory(&a.id).await.unwrap());

    let network = engine.network(Some(0.3)).await;
    assert_eq!(network.total_memories, 2);
    assert!(network.nodes.iter().all(|n| n.id != a.id));
    assert!(network.edges.iter().all(|e| e.from != a.id && e.to != a.id));
}

#[tokio::test]
async fn test_boost_and_invalid_factor() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    let memory = engine.add_memory("I play the piano", vec![]).await.unwrap();
    engine.boost_memory(&memory.id, 0.0).await.unwrap();
    assert_eq!(engine.get_memory(&memory.id).await.unwrap().score, 0.0);

    let err = engine.boost_memory(&memory.id, -1.0).await.unwrap_err();
    assert!(matches!(err, MemoryError::InvalidArgument(_)));

    let err = engine.boost_memory("mem_nope", 2.0).await.unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[tokio::test]
async fn test_recalculate_keeps_scores_non_negative() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    for content in [
        "I like green tea",
        "green tea in the morning",
        "my favorite tea is green tea",
        "short",
    ] {
        engine.add_memory(content, vec![]).await.unwrap();
    }
    engine.recalculate_all_scores(0.35).await.unwrap();

    let memories = engine.get_all_memories(None).await;
    assert_eq!(memories.len(), 4);
    assert!(memories.iter().all(|m| m.score >= 0.0));
    for pair in memories.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_memories_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);

    let (first, second) = {
        let engine = open_engine(&path).await;
        let first = engine
            .add_memory("first memory about gardening", vec!["garden".into()])
            .await
            .unwrap();
        let second = engine
            .add_memory("second memory about gardening tools", vec![])
            .await
            .unwrap();
        (first, second)
    };

    let engine = open_engine(&path).await;
    assert_eq!(engine.len().await, 2);

    let reloaded = engine.get_memory(&first.id).await.unwrap();
    assert_eq!(reloaded.content, first.content);
    assert_eq!(reloaded.tags, vec!["garden".to_string()]);
    assert!(engine.get_memory(&second.id).await.is_some());
}

#[tokio::test]
async fn test_reload_with_corrupt_file_keeps_state() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);
    let engine = open_engine(&path).await;

    engine.add_memory("keep me around", vec![]).await.unwrap();
    engine.add_memory("and me as well", vec![]).await.unwrap();

    let before = engine.get_all_memories(None).await;

    std::fs::write(&path, "{ this is not json").unwrap();
    engine.reload_from_disk().await.unwrap();
    assert_eq!(engine.len().await, 2);

    // the unreadable file is replaced by the in-memory state, not the older backup
    let on_disk = JsonFileRepository::new(&path).load().await.unwrap();
    assert_eq!(on_disk.len(), 2);

    engine.reload_from_disk().await.unwrap();
    assert_eq!(engine.get_all_memories(None).await, before);

    drop(engine);
    let reopened = open_engine(&path).await;
    assert_eq!(reopened.get_all_memories(None).await, before);
}

#[tokio::test]
async fn test_reload_round_trip_is_lossless() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    engine
        .add_memory("User loves pepperoni pizza", vec!["food".into()])
        .await
        .unwrap();
    engine
        .add_memory("User works as a data engineer", vec!["work".into(), "data".into()])
        .await
        .unwrap();
    engine.search_memories("pepperoni", 5, 0.2).await.unwrap();

    let before = engine.get_all_memories(None).await;
    engine.reload_from_disk().await.unwrap();
    let after = engine.get_all_memories(None).await;

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_reload_picks_up_external_changes() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);
    let engine = open_engine(&path).await;
    engine.add_memory("original memory", vec![]).await.unwrap();

    let external = JsonFileRepository::new(&path);
    let mut memories = external.load().await.unwrap();
    memories.push(Memory::new("written by another process", vec![]));
    external.save_all(&memories).await.unwrap();

    engine.reload_from_disk().await.unwrap();
    assert_eq!(engine.len().await, 2);
}

#[tokio::test]
async fn test_legacy_file_is_migrated_on_open() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);
    std::fs::write(
        &path,
        r#"{"user_memories":{"hobbies":[{"id":"mem_old","content":"Plays chess","weight":4}]}}"#,
    )
    .unwrap();

    let engine = open_engine(&path).await;
    let memory = engine.get_memory("mem_old").await.unwrap();
    assert_eq!(memory.score, 80.0);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"memories\""));
    assert!(!text.contains("user_memories"));
}

#[tokio::test]
async fn test_migrate_to_another_repository() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;
    engine.add_memory("one", vec![]).await.unwrap();
    engine.add_memory("two", vec![]).await.unwrap();

    let target = JsonFileRepository::new(dir.path().join("copy.json"));
    assert_eq!(engine.migrate_to(&target).await.unwrap(), 2);
    let mut copied: Vec<String> = target.load().await.unwrap().into_iter().map(|m| m.id).collect();
    let mut original: Vec<String> = engine
        .get_all_memories(None)
        .await
        .into_iter()
        .map(|m| m.id)
        .collect();
    copied.sort();
    original.sort();
    assert_eq!(copied, original);
}

#[tokio::test]
async fn test_views_after_reopen_build_the_index_lazily() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);
    let expected = {
        let engine = open_engine(&path).await;
        engine
            .add_memory("rust ownership and borrowing rules", vec![])
            .await
            .unwrap();
        engine
            .add_memory("rust ownership and borrowing explained", vec![])
            .await
            .unwrap();
        engine.stats().await.total_connections
    };
    assert_eq!(expected, 1);

    let engine = Arc::new(open_engine(&path).await);
    let (stats, network) = tokio::join!(engine.stats(), engine.network(Some(0.35)));
    assert_eq!(stats.total_memories, 2);
    assert_eq!(stats.total_connections, expected);
    assert_eq!(network.connections, 1);

    // second round runs on the already-complete index
    let (again, _) = tokio::join!(engine.stats(), engine.network(None));
    assert_eq!(again.total_connections, expected);
}

// =============================================================================
// Views
// =============================================================================

#[tokio::test]
async fn test_export_respects_context_limit() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;
    for i in 0..5 {
        engine
            .add_memory(&format!("memory number {i} with some text"), vec![])
            .await
            .unwrap();
    }

    let none = engine.export_for_llm(10).await.unwrap();
    assert!(none.memories.is_empty());
    assert_eq!(none.total_score, 0.0);

    let all = engine.export_for_llm(100_000).await.unwrap();
    assert_eq!(all.memories.len(), 5);
    let sum: f64 = all.memories.iter().map(|m| m.score).sum();
    assert!((all.total_score - sum).abs() < 1e-9);
}

#[tokio::test]
async fn test_memories_since_filters_by_date() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);
    std::fs::write(
        &path,
        r#"{"memories":[
            {"id":"mem_a","content":"old","score":1.0,"created":"2020-01-01"},
            {"id":"mem_b","content":"newer","score":1.0,"created":"2024-06-01"},
            {"id":"mem_c","content":"newest","score":1.0,"created":"2024-07-01"}
        ]}"#,
    )
    .unwrap();
    let engine = open_engine(&path).await;

    let since = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let recent = engine.memories_since(since).await;
    let ids: Vec<&str> = recent.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["mem_c", "mem_b"]);
}

#[tokio::test]
async fn test_stats_report_totals() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&store_path(&dir)).await;

    let empty = engine.stats().await;
    assert_eq!(empty.total_memories, 0);
    assert_eq!(empty.average_score, 0.0);

    engine.add_memory("stats memory one", vec![]).await.unwrap();
    engine.add_memory("stats memory two", vec![]).await.unwrap();
    let stats = engine.stats().await;
    assert_eq!(stats.total_memories, 2);
    assert!(stats.backend.starts_with("file:"));
}

// =============================================================================
// Degraded Mode
// =============================================================================

#[tokio::test]
async fn test_keyword_fallback_when_embeddings_unavailable() {
    let dir = TempDir::new().unwrap();
    let engine = open_with(&store_path(&dir), Arc::new(OfflineEmbedder)).await;

    let memory = engine
        .add_memory("I love pepperoni pizza", vec![])
        .await
        .unwrap();
    engine.add_memory("The sky is blue", vec![]).await.unwrap();
    assert!(engine.is_degraded());
    assert_eq!(memory.score, 0.0);

    let results = engine
        .search_memories("pepperoni pizza", 5, 0.2)
        .await
        .unwrap();
    assert_eq!(results.mode, SearchMode::Keyword);
    assert_eq!(results.hits.len(), 1);
    assert_eq!(results.hits[0].memory.id, memory.id);

    // keyword hits do not reinforce
    assert_eq!(engine.get_memory(&memory.id).await.unwrap().score, 0.0);

    let err = engine.recalculate_all_scores(0.35).await.unwrap_err();
    assert!(matches!(err, MemoryError::EmbeddingUnavailable(_)));

    let network = engine.network(None).await;
    assert_eq!(network.total_memories, 2);
    assert!(network.edges.is_empty());
}
