use clap::{Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Path of the JSON memory file (file backend)
    #[arg(long)]
    pub storage_path: Option<String>,

    /// Embedding provider: fastembed or hashed
    #[arg(long)]
    pub embedding_provider: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Copy the configured store into a SurrealDB instance
    Migrate {
        /// Target connection string, e.g. `surrealkv://data/memories.db` or `ws://host:8000`
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "memnet")]
        namespace: String,
        #[arg(long, default_value = "memories")]
        database: String,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub scoring: ScoringConfig,
    pub dedupe: DedupeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Surreal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
    pub database_url: String,
    pub namespace: String,
    pub database: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Fastembed,
    Hashed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    /// Vector size for the hashed provider
    pub dimension: usize,
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    pub base_threshold: f32,
    pub network_threshold: f32,
    pub default_top_k: usize,
    pub min_relevance: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupeConfig {
    /// Identical add requests within this window are rejected
    pub window_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    /// Priority: CLI flag > environment (`MEMNET_` prefix) > config file > defaults.
    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("storage.backend", "file")?
            .set_default("storage.path", "data/memories.json")?
            .set_default("storage.database_url", "surrealkv://data/memories.db")?
            .set_default("storage.namespace", "memnet")?
            .set_default("storage.database", "memories")?
            .set_default("embedding.provider", "fastembed")?
            .set_default("embedding.dimension", 1024)?
            .set_default("embedding.show_download_progress", false)?
            .set_default("scoring.base_threshold", 0.35)?
            .set_default("scoring.network_threshold", 0.4)?
            .set_default("scoring.default_top_k", 10)?
            .set_default("scoring.min_relevance", 0.2)?
            .set_default("dedupe.window_secs", 5)?;

        // 2. Config file: explicit path, else ./config.yaml when present
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config.yaml").required(false));
        }

        // 3. Environment, e.g. MEMNET_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("MEMNET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI overrides
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(path) = &cli.storage_path {
            builder = builder.set_override("storage.path", path.as_str())?;
        }
        if let Some(provider) = &cli.embedding_provider {
            builder = builder.set_override("embedding.provider", provider.as_str())?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}
