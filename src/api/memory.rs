use crate::AppState;
use crate::domain::{LlmContext, Memory, MemoryStats, NetworkView, SearchResults};
use crate::error::MemoryError;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

const STORAGE_UNAVAILABLE: &str = "memory storage temporarily unavailable";

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Map engine errors onto HTTP status codes. Storage details stay in the log.
pub fn error_response(e: MemoryError) -> (StatusCode, String) {
    match e {
        MemoryError::Validation(msg) | MemoryError::InvalidArgument(msg) => {
            (StatusCode::BAD_REQUEST, msg)
        }
        MemoryError::NotFound(id) => (StatusCode::NOT_FOUND, format!("Memory '{id}' not found")),
        MemoryError::Storage(e) => {
            tracing::error!(error = %e, "Storage failure");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                STORAGE_UNAVAILABLE.to_string(),
            )
        }
        MemoryError::EmbeddingUnavailable(e) => {
            tracing::warn!(error = %e, "Embedding provider unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "embedding provider unavailable".to_string(),
            )
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AddMemoryRequest {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub top_k: Option<usize>,
    pub min_relevance: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub context_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct BoostRequest {
    #[serde(default = "default_boost_factor")]
    pub factor: f64,
}

fn default_boost_factor() -> f64 {
    1.2
}

#[derive(Debug, Default, Deserialize)]
pub struct RecalculateRequest {
    pub threshold: Option<f32>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/memories - Stored memories, highest score first
pub async fn list_memories(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Memory>> {
    Json(state.engine.get_all_memories(query.limit).await)
}

/// POST /api/memories - Store a new memory
pub async fn add_memory(
    State(state): State<AppState>,
    Json(req): Json<AddMemoryRequest>,
) -> ApiResult<(StatusCode, Json<Memory>)> {
    if req.content.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "content must not be empty".to_string(),
        ));
    }
    if !state.dedupe.check_and_record(&req.content, &req.tags) {
        tracing::info!("Duplicate add request ignored");
        return Err((
            StatusCode::CONFLICT,
            "identical memory was submitted moments ago".to_string(),
        ));
    }

    match state.engine.add_memory(&req.content, req.tags.clone()).await {
        Ok(memory) => Ok((StatusCode::CREATED, Json(memory))),
        Err(e) => {
            state.dedupe.forget(&req.content, &req.tags);
            Err(error_response(e))
        }
    }
}

/// GET /api/memories/{id}
pub async fn get_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Memory>> {
    state
        .engine
        .get_memory(&id)
        .await
        .map(Json)
        .ok_or_else(|| error_response(MemoryError::NotFound(id)))
}

/// DELETE /api/memories/{id}
pub async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let deleted = state
        .engine
        .delete_memory(&id)
        .await
        .map_err(error_response)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error_response(MemoryError::NotFound(id)))
    }
}

/// POST /api/memories/{id}/boost - Multiply a memory's score
pub async fn boost_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<BoostRequest>,
) -> ApiResult<Json<Memory>> {
    state
        .engine
        .boost_memory(&id, req.factor)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/memories/search?q=...
pub async fn search_memories(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResults>> {
    let scoring = &state.config.scoring;
    let top_k = query.top_k.unwrap_or(scoring.default_top_k);
    let min_relevance = query.min_relevance.unwrap_or(scoring.min_relevance);

    state
        .engine
        .search_memories(&query.q, top_k, min_relevance)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/memories/new?since=YYYY-MM-DD
pub async fn memories_since(
    State(state): State<AppState>,
    Query(query): Query<SinceQuery>,
) -> Json<Vec<Memory>> {
    Json(state.engine.memories_since(query.since).await)
}

/// GET /api/memories/stats
pub async fn stats(State(state): State<AppState>) -> Json<MemoryStats> {
    Json(state.engine.stats().await)
}

/// GET /api/memories/export - Top memories packed for a prompt
pub async fn export_for_llm(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Json<LlmContext>> {
    state
        .engine
        .export_for_llm(query.context_limit.unwrap_or(2000))
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /api/memories/recalculate - Rescore from graph structure alone
pub async fn recalculate(
    State(state): State<AppState>,
    Json(req): Json<RecalculateRequest>,
) -> ApiResult<Json<MemoryStats>> {
    let threshold = req
        .threshold
        .unwrap_or(state.config.scoring.base_threshold);
    state
        .engine
        .recalculate_all_scores(threshold)
        .await
        .map_err(error_response)?;
    Ok(Json(state.engine.stats().await))
}

/// POST /api/memories/reload - Re-read the backing store
pub async fn reload(State(state): State<AppState>) -> ApiResult<Json<MemoryStats>> {
    state
        .engine
        .reload_from_disk()
        .await
        .map_err(error_response)?;
    Ok(Json(state.engine.stats().await))
}

/// GET /api/memory-network?threshold=
pub async fn memory_network(
    State(state): State<AppState>,
    Query(query): Query<ThresholdQuery>,
) -> Json<NetworkView> {
    Json(state.engine.network(query.threshold).await)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "memories": state.engine.len().await,
        "backend": state.engine.backend(),
        "degraded": state.engine.is_degraded(),
    }))
}

/// GET /metrics - Prometheus exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
