pub mod dedupe;
pub mod memory;

use crate::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub use dedupe::RecentRequests;

/// Build the memory API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/memories",
            get(memory::list_memories).post(memory::add_memory),
        )
        .route("/api/memories/search", get(memory::search_memories))
        .route("/api/memories/new", get(memory::memories_since))
        .route("/api/memories/stats", get(memory::stats))
        .route("/api/memories/export", get(memory::export_for_llm))
        .route("/api/memories/recalculate", post(memory::recalculate))
        .route("/api/memories/reload", post(memory::reload))
        .route(
            "/api/memories/{id}",
            get(memory::get_memory).delete(memory::delete_memory),
        )
        .route("/api/memories/{id}/boost", post(memory::boost_memory))
        .route("/api/memory-network", get(memory::memory_network))
        .route("/health", get(memory::health))
        .route("/metrics", get(memory::metrics))
}
