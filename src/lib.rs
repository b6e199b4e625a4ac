//! Memory Network
//!
//! A self-organizing memory store. Every memory is embedded, linked to its
//! semantic neighbours in a similarity graph, and scored by how central it is
//! in that graph. Memories that keep getting recalled gain importance, and
//! part of that gain flows out to their neighbours.
//!
//! # Modules
//!
//! - [`domain`]: Memory records, search hits and the network view
//! - [`runtime`]: Embedding providers, graph builder, scoring, reinforcement and the engine
//! - [`persistence`]: Repository trait with JSON file and SurrealDB backends
//! - [`api`]: Axum handlers over [`runtime::MemoryEngine`]
//! - [`server`]: Bootstrap from [`config::AppConfig`]

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod runtime;
pub mod server;
pub mod telemetry;

use crate::api::RecentRequests;
use crate::config::AppConfig;
use crate::runtime::MemoryEngine;

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

pub use error::{EmbeddingError, MemoryError, Result, StorageError};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The memory engine.
    pub engine: Arc<MemoryEngine>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
    /// Recently seen add requests
    pub dedupe: Arc<RecentRequests>,
    /// Prometheus handle, if this process owns the recorder
    pub metrics: Option<PrometheusHandle>,
}
