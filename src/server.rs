use anyhow::Context;
use axum::{Router, extract::DefaultBodyLimit};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::AppState;
use crate::api::{self, RecentRequests};
use crate::config::{
    AppConfig, EmbeddingConfig, EmbeddingProviderKind, StorageBackend, StorageConfig,
};
use crate::persistence::{
    MemoryRepository,
    providers::{JsonFileRepository, SurrealDbRepository},
};
use crate::runtime::{
    EmbeddingProvider, EngineSettings, FastEmbedProvider, HashedEmbedder, MemoryEngine,
};

/// Open the configured repository backend.
pub async fn open_repository(
    storage: &StorageConfig,
) -> anyhow::Result<Arc<dyn MemoryRepository>> {
    let repository: Arc<dyn MemoryRepository> = match storage.backend {
        StorageBackend::File => Arc::new(JsonFileRepository::new(&storage.path)),
        StorageBackend::Surreal => Arc::new(
            SurrealDbRepository::new(
                &storage.database_url,
                &storage.namespace,
                &storage.database,
            )
            .await
            .with_context(|| format!("Failed to connect to {}", storage.database_url))?,
        ),
    };
    Ok(repository)
}

/// Construct the configured embedding provider. Model download for
/// `fastembed` happens lazily on first use.
pub fn build_embedder(embedding: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match embedding.provider {
        EmbeddingProviderKind::Fastembed => {
            Arc::new(FastEmbedProvider::new(embedding.show_download_progress))
        }
        EmbeddingProviderKind::Hashed => Arc::new(HashedEmbedder::new(embedding.dimension)),
    }
}

/// Open the configured repository with the configured embedder.
pub async fn open_engine(config: &AppConfig) -> anyhow::Result<MemoryEngine> {
    let repository = open_repository(&config.storage).await?;
    let embedder = build_embedder(&config.embedding);
    let settings = EngineSettings {
        base_threshold: config.scoring.base_threshold,
        network_threshold: config.scoring.network_threshold,
    };

    MemoryEngine::open(repository, embedder, settings)
        .await
        .context("Failed to open memory store")
}

/// Open the engine and assemble the shared handler state.
pub async fn build_state(
    config: Arc<AppConfig>,
    metrics: Option<PrometheusHandle>,
) -> anyhow::Result<AppState> {
    let engine = open_engine(&config).await?;
    if !engine.warm_index().await {
        warn!("Starting with keyword search until embeddings are available");
    }

    Ok(AppState {
        engine: Arc::new(engine),
        dedupe: Arc::new(RecentRequests::new(Duration::from_secs(
            config.dedupe.window_secs,
        ))),
        config,
        metrics,
    })
}

pub fn build_router(state: AppState) -> Router {
    api::router()
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let metrics = crate::telemetry::install_metrics();
    let state = build_state(Arc::clone(&config), metrics).await?;

    info!(
        name: "memory.store.ready",
        memories = state.engine.len().await,
        backend = %state.engine.backend(),
        "Memory store ready"
    );

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Copy every memory from the configured store into a SurrealDB target.
pub async fn migrate(
    config: &AppConfig,
    target_url: &str,
    namespace: &str,
    database: &str,
) -> anyhow::Result<usize> {
    let target = SurrealDbRepository::new(target_url, namespace, database)
        .await
        .with_context(|| format!("Failed to connect to {target_url}"))?;
    migrate_into(config, &target).await
}

/// Open the configured store and copy it into `target`. The embedding index
/// is not built, so no model is loaded.
pub async fn migrate_into(
    config: &AppConfig,
    target: &dyn MemoryRepository,
) -> anyhow::Result<usize> {
    let engine = open_engine(config).await?;
    let count = engine
        .migrate_to(target)
        .await
        .context("Failed to write target store")?;

    info!(
        name: "memory.migrated",
        count,
        to = %target.describe(),
        "Migration complete"
    );
    Ok(count)
}
