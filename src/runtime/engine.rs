use crate::domain::{
    EdgeStrength, LlmContext, Memory, MemoryStats, NetworkEdge, NetworkNode, NetworkView,
    ScoredMemory, SearchMode, SearchResults,
};
use crate::error::{EmbeddingError, MemoryError, Result};
use crate::persistence::MemoryRepository;
use crate::runtime::embedding::{EmbeddingProvider, cosine_similarity};
use crate::runtime::graph::{
    DEFAULT_BASE_THRESHOLD, GraphInput, NETWORK_THRESHOLD, SimilarityGraph,
};
use crate::runtime::keyword::keyword_search;
use crate::runtime::reinforcement;
use crate::runtime::scoring::{round2, score_all};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Tunables for graph construction.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Base similarity threshold for the scoring graph.
    pub base_threshold: f32,
    /// Default base threshold for the visualization network.
    pub network_threshold: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_threshold: DEFAULT_BASE_THRESHOLD,
            network_threshold: NETWORK_THRESHOLD,
        }
    }
}

/// Vectors for the current memories, keyed by memory id. Content is
/// immutable, so a cached vector stays valid for the life of its memory.
#[derive(Debug, Default)]
struct EmbeddingIndex {
    vectors: HashMap<String, Vec<f32>>,
}

impl EmbeddingIndex {
    /// Drop rows for removed memories and embed the ones not yet indexed.
    async fn sync(
        &mut self,
        memories: &[Memory],
        embedder: &dyn EmbeddingProvider,
    ) -> std::result::Result<(), EmbeddingError> {
        let live: HashSet<&str> = memories.iter().map(|m| m.id.as_str()).collect();
        self.vectors.retain(|id, _| live.contains(id.as_str()));

        let missing: Vec<&Memory> = memories
            .iter()
            .filter(|m| !self.vectors.contains_key(&m.id))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        debug!(count = missing.len(), "Embedding memories for search index");
        let texts = missing.iter().map(|m| m.content.clone()).collect();
        let vectors = embedder.embed(texts).await?;
        if vectors.len() != missing.len() {
            return Err(EmbeddingError::EmptyOutput {
                expected: missing.len(),
                actual: vectors.len(),
            });
        }
        for (memory, vector) in missing.into_iter().zip(vectors) {
            self.vectors.insert(memory.id.clone(), vector);
        }
        Ok(())
    }

    /// Whether every memory has a vector and no stale rows remain.
    fn covers(&self, memories: &[Memory]) -> bool {
        self.vectors.len() == memories.len()
            && memories.iter().all(|m| self.vectors.contains_key(&m.id))
    }

    /// One row per memory, in memory order. `None` if the index is stale.
    fn rows<'a>(&'a self, memories: &[Memory]) -> Option<Vec<GraphInput<'a>>> {
        if self.vectors.len() != memories.len() {
            return None;
        }
        memories
            .iter()
            .map(|m| {
                self.vectors.get(&m.id).map(|v| GraphInput {
                    words: m.word_count(),
                    vector: v.as_slice(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    memories: Vec<Memory>,
    index: EmbeddingIndex,
}

/// The memory store: owns the memory list, its embedding index and the
/// repository it persists to.
///
/// Mutating operations take the write lock for their whole
/// read-modify-persist cycle, so they never interleave. Changes are made on a
/// copy of the list and only become visible once the repository accepted them.
pub struct MemoryEngine {
    repository: Arc<dyn MemoryRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: EngineSettings,
    state: RwLock<StoreState>,
    degraded: AtomicBool,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("repository", &self.repository.describe())
            .field("embedder", &self.embedder.name())
            .field("settings", &self.settings)
            .field("degraded", &self.degraded.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryEngine {
    /// Load the store from `repository` and build the initial index.
    pub async fn open(
        repository: Arc<dyn MemoryRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let memories = repository.load().await?;
        info!(
            count = memories.len(),
            backend = %repository.describe(),
            embedder = embedder.name(),
            "Memory store opened"
        );
        metrics::gauge!("memory.count").set(memories.len() as f64);

        Ok(Self {
            repository,
            embedder,
            settings,
            state: RwLock::new(StoreState {
                memories,
                index: EmbeddingIndex::default(),
            }),
            degraded: AtomicBool::new(false),
        })
    }

    /// Embed every stored memory now instead of on first use. Returns whether
    /// the index is complete.
    pub async fn warm_index(&self) -> bool {
        let mut guard = self.state.write().await;
        let StoreState { memories, index } = &mut *guard;
        self.sync_index(index, memories).await
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn backend(&self) -> String {
        self.repository.describe()
    }

    /// Whether the last embedding attempt failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Index and Scoring
    // =========================================================================

    async fn sync_index(&self, index: &mut EmbeddingIndex, memories: &[Memory]) -> bool {
        match index.sync(memories, self.embedder.as_ref()).await {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    info!("Embedding provider recovered, semantic search restored");
                }
                true
            }
            Err(e) => {
                error!(
                    error = %e,
                    embedder = self.embedder.name(),
                    "Embedding provider unavailable, search degraded to keyword matching"
                );
                self.degraded.store(true, Ordering::Relaxed);
                false
            }
        }
    }

    /// Rebuild the similarity graph over `memories` and rescore them.
    async fn rebuild_and_score(
        &self,
        index: &mut EmbeddingIndex,
        memories: &mut [Memory],
        threshold: f32,
        preserve_existing: bool,
    ) -> Option<SimilarityGraph> {
        if !self.sync_index(index, memories).await {
            return None;
        }
        let graph = SimilarityGraph::build(&index.rows(memories)?, threshold)?;
        score_all(memories, &graph, preserve_existing);
        Some(graph)
    }

    async fn commit(&self, state: &mut StoreState, next: Vec<Memory>) -> Result<()> {
        self.repository.save_all(&next).await?;
        state.memories = next;
        metrics::gauge!("memory.count").set(state.memories.len() as f64);
        Ok(())
    }

    // =========================================================================
    // Store Operations
    // =========================================================================

    /// Store a new memory and rescore the graph, keeping reinforcement.
    pub async fn add_memory(&self, content: &str, tags: Vec<String>) -> Result<Memory> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MemoryError::Validation(
                "memory content must not be empty".to_string(),
            ));
        }

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let memory = Memory::new(content, tags);
        let mut next = state.memories.clone();
        next.push(memory.clone());
        self.rebuild_and_score(&mut state.index, &mut next, self.settings.base_threshold, true)
            .await;

        let created = next
            .iter()
            .find(|m| m.id == memory.id)
            .cloned()
            .unwrap_or(memory);
        self.commit(state, next).await?;

        metrics::counter!("memory.added").increment(1);
        info!(memory_id = %created.id, score = created.score, "Memory added");
        Ok(created)
    }

    /// Remove a memory and rescore the survivors. Returns whether it existed.
    pub async fn delete_memory(&self, id: &str) -> Result<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(position) = state.memories.iter().position(|m| m.id == id) else {
            debug!(memory_id = %id, "Delete requested for unknown memory");
            return Ok(false);
        };

        let mut next = state.memories.clone();
        next.remove(position);
        self.rebuild_and_score(&mut state.index, &mut next, self.settings.base_threshold, true)
            .await;
        self.commit(state, next).await?;

        metrics::counter!("memory.deleted").increment(1);
        info!(memory_id = %id, "Memory deleted");
        Ok(true)
    }

    /// Memories by descending score, optionally capped.
    pub async fn get_all_memories(&self, limit: Option<usize>) -> Vec<Memory> {
        let guard = self.state.read().await;
        let mut memories = guard.memories.clone();
        drop(guard);

        memories.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(limit) = limit {
            memories.truncate(limit);
        }
        memories
    }

    pub async fn top_memories(&self, limit: usize) -> Vec<Memory> {
        self.get_all_memories(Some(limit)).await
    }

    pub async fn get_memory(&self, id: &str) -> Option<Memory> {
        let guard = self.state.read().await;
        guard.memories.iter().find(|m| m.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.memories.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // =========================================================================
    // Search and Reinforcement
    // =========================================================================

    /// Rank memories against `query` and reinforce the returned hits.
    ///
    /// Falls back to keyword matching (without reinforcement) when the
    /// embedding provider fails.
    pub async fn search_memories(
        &self,
        query: &str,
        top_k: usize,
        min_relevance: f32,
    ) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MemoryError::Validation(
                "search query must not be empty".to_string(),
            ));
        }
        metrics::counter!("memory.search").increment(1);

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if state.memories.is_empty() || top_k == 0 {
            return Ok(SearchResults {
                mode: SearchMode::Semantic,
                hits: Vec::new(),
            });
        }

        let query_vector = match self.embedder.embed(vec![query.to_string()]).await {
            Ok(mut vectors) => vectors.pop(),
            Err(e) => {
                warn!(error = %e, "Query embedding failed");
                None
            }
        };
        let indexed = self.sync_index(&mut state.index, &state.memories).await;

        let (Some(query_vector), true) = (query_vector, indexed) else {
            self.degraded.store(true, Ordering::Relaxed);
            metrics::counter!("memory.search.degraded").increment(1);
            warn!(query = %query, "Serving keyword search while embeddings are unavailable");
            return Ok(SearchResults {
                mode: SearchMode::Keyword,
                hits: keyword_search(&state.memories, query, top_k, min_relevance),
            });
        };

        let mut hits: Vec<ScoredMemory> = state
            .memories
            .iter()
            .filter_map(|memory| {
                let vector = state.index.vectors.get(&memory.id)?;
                let relevance = cosine_similarity(&query_vector, vector);
                (relevance > min_relevance).then(|| ScoredMemory::rank(memory.clone(), relevance))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        debug!(query = %query, hits = hits.len(), "Semantic search ranked");

        if !hits.is_empty() {
            let recalled: Vec<(String, f32)> = hits
                .iter()
                .map(|h| (h.memory.id.clone(), h.relevance_score))
                .collect();
            self.reinforce_locked(state, &recalled).await?;
        }

        Ok(SearchResults {
            mode: SearchMode::Semantic,
            hits,
        })
    }

    /// Reinforce recalled memories and their graph neighborhood. Unknown ids
    /// are skipped. Returns how many memories received reinforcement.
    pub async fn reinforce(&self, recalled: &[(String, f32)]) -> Result<usize> {
        let mut guard = self.state.write().await;
        self.reinforce_locked(&mut guard, recalled).await
    }

    async fn reinforce_locked(
        &self,
        state: &mut StoreState,
        recalled: &[(String, f32)],
    ) -> Result<usize> {
        if recalled.is_empty() {
            return Ok(0);
        }

        let mut next = state.memories.clone();
        let Some(graph) = self
            .rebuild_and_score(&mut state.index, &mut next, self.settings.base_threshold, true)
            .await
        else {
            warn!("No connection graph available for reinforcement");
            return Ok(0);
        };

        let totals = reinforcement::plan(&next, &graph, recalled);
        let touched = reinforcement::apply(&mut next, &totals);
        self.commit(state, next).await?;

        metrics::counter!("memory.reinforced").increment(touched as u64);
        info!(
            recalled = recalled.len(),
            touched, "Reinforcement applied to recalled memories and neighbors"
        );
        Ok(touched)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rescore everything from graph structure alone. Discards reinforcement.
    pub async fn recalculate_all_scores(&self, threshold: f32) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let mut next = state.memories.clone();
        if self
            .rebuild_and_score(&mut state.index, &mut next, threshold, false)
            .await
            .is_none()
            && !next.is_empty()
        {
            return Err(MemoryError::EmbeddingUnavailable(EmbeddingError::Inference(
                "cannot recalculate scores without embeddings".to_string(),
            )));
        }
        self.commit(state, next).await?;
        info!(threshold, "All scores recalculated from scratch");
        Ok(())
    }

    /// Re-read the repository. A failed read keeps the current in-memory state
    /// and writes it back over the unreadable copy; the error only reaches the
    /// caller if neither that nor a backup restore succeeds.
    pub async fn reload_from_disk(&self) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        match self.repository.load().await {
            Ok(memories) => {
                info!(count = memories.len(), "Reloaded memories from storage");
                state.memories = memories;
                metrics::gauge!("memory.count").set(state.memories.len() as f64);
            }
            Err(e) => {
                warn!(error = %e, "Error reloading memories, keeping current state");
                self.repair_storage(&state.memories).await?;
            }
        }

        let StoreState { memories, index } = state;
        self.sync_index(index, memories).await;
        Ok(())
    }

    /// Bring unreadable storage back in line with the in-memory state. The
    /// backup is one write behind memory, so it is only used when there is
    /// nothing in memory to write or writing it fails.
    async fn repair_storage(&self, memories: &[Memory]) -> Result<()> {
        if !memories.is_empty() {
            match self.repository.save_all(memories).await {
                Ok(()) => {
                    info!(
                        count = memories.len(),
                        "Storage rewritten from in-memory state"
                    );
                    return Ok(());
                }
                Err(e) => warn!(error = %e, "Rewriting storage failed, trying backup"),
            }
        }

        match self.repository.restore_backup().await {
            Ok(true) => info!("Storage restored from backup"),
            Ok(false) => debug!("No backup available to restore"),
            Err(restore) => {
                error!(error = %restore, "Failed to restore storage from backup");
                return Err(restore.into());
            }
        }
        Ok(())
    }

    /// Multiply one memory's score by `factor`.
    pub async fn boost_memory(&self, id: &str, factor: f64) -> Result<Memory> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(MemoryError::InvalidArgument(format!(
                "boost factor must be a non-negative number, got {factor}"
            )));
        }

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let mut next = state.memories.clone();
        let memory = next
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        memory.score = round2(memory.score * factor);
        let boosted = memory.clone();

        self.commit(state, next).await?;
        info!(memory_id = %id, factor, score = boosted.score, "Memory boosted");
        Ok(boosted)
    }

    /// Copy every memory into another backend.
    pub async fn migrate_to(&self, target: &dyn MemoryRepository) -> Result<usize> {
        let guard = self.state.read().await;
        target.save_all(&guard.memories).await?;
        info!(
            count = guard.memories.len(),
            from = %self.repository.describe(),
            to = %target.describe(),
            "Memories migrated"
        );
        Ok(guard.memories.len())
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Highest-scored memories that fit in `context_limit` characters of JSON.
    pub async fn export_for_llm(&self, context_limit: usize) -> Result<LlmContext> {
        let pool = self.top_memories(100).await;

        let mut memories = Vec::new();
        let mut total_chars = 0;
        for memory in pool {
            let size = serde_json::to_string(&memory)
                .map_err(crate::error::StorageError::from)?
                .len();
            if total_chars + size > context_limit {
                break;
            }
            total_chars += size;
            memories.push(memory);
        }

        let total_score = memories.iter().map(|m| m.score).sum();
        Ok(LlmContext {
            memories,
            total_score,
        })
    }

    /// Memories created on or after `since`, newest first, at most 100.
    pub async fn memories_since(&self, since: NaiveDate) -> Vec<Memory> {
        let guard = self.state.read().await;
        let mut recent: Vec<Memory> = guard
            .memories
            .iter()
            .filter(|m| m.created >= since)
            .cloned()
            .collect();
        drop(guard);

        recent.sort_by(|a, b| b.created.cmp(&a.created));
        recent.truncate(100);
        recent
    }

    /// Run a read-only view over the memories and, when it is complete, the
    /// embedding index. Concurrent views share the read lock; the write lock
    /// is only taken when the index has to catch up first.
    async fn read_view<R>(
        &self,
        view: impl FnOnce(&[Memory], Option<&EmbeddingIndex>) -> R,
    ) -> R {
        {
            let guard = self.state.read().await;
            if guard.index.covers(&guard.memories) {
                return view(&guard.memories, Some(&guard.index));
            }
        }

        let mut guard = self.state.write().await;
        let synced = {
            let StoreState { memories, index } = &mut *guard;
            self.sync_index(index, memories).await
        };
        let guard = guard.downgrade();
        view(&guard.memories, synced.then_some(&guard.index))
    }

    pub async fn stats(&self) -> MemoryStats {
        let base_threshold = self.settings.base_threshold;
        let (total_memories, total_connections, average_score) = self
            .read_view(|memories, index| {
                let total_connections = index
                    .and_then(|index| index.rows(memories))
                    .and_then(|rows| SimilarityGraph::build(&rows, base_threshold))
                    .map_or(0, |g| g.edge_count());

                let average_score = if memories.is_empty() {
                    0.0
                } else {
                    let total: f64 = memories.iter().map(|m| m.score).sum();
                    round2(total / memories.len() as f64)
                };
                (memories.len(), total_connections, average_score)
            })
            .await;

        MemoryStats {
            total_memories,
            total_connections,
            average_score,
            backend: self.repository.describe(),
        }
    }

    /// Nodes and thresholded similarity edges for visualization.
    pub async fn network(&self, threshold: Option<f32>) -> NetworkView {
        let threshold = threshold.unwrap_or(self.settings.network_threshold);

        self.read_view(|memories, index| {
            let nodes: Vec<NetworkNode> = memories.iter().map(network_node).collect();

            let edges: Vec<NetworkEdge> = index
                .and_then(|index| index.rows(memories))
                .and_then(|rows| SimilarityGraph::build(&rows, threshold))
                .map(|g| {
                    g.edges()
                        .into_iter()
                        .map(|(i, j, sim)| NetworkEdge {
                            from: memories[i].id.clone(),
                            to: memories[j].id.clone(),
                            value: sim,
                            label: format!("{sim:.2}"),
                            strength: EdgeStrength::classify(sim),
                        })
                        .collect()
                })
                .unwrap_or_default();

            NetworkView {
                total_memories: nodes.len(),
                connections: edges.len(),
                nodes,
                edges,
            }
        })
        .await
    }
}

fn network_node(memory: &Memory) -> NetworkNode {
    let mut label: String = memory.content.chars().take(50).collect();
    if memory.content.chars().count() > 50 {
        label.push_str("...");
    }
    NetworkNode {
        id: memory.id.clone(),
        label,
        title: memory.content.clone(),
        score: memory.score,
        created: memory.created,
        tags: memory.tags.clone(),
        size: 20.0 + memory.score.min(100.0) * 0.5,
    }
}
