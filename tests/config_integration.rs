use memory_network::config::{AppConfig, EmbeddingProviderKind, StorageBackend};
use serial_test::serial;
use std::env;
use std::fs;

// Clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("PORT");
        env::remove_var("CONFIG_FILE");
        env::remove_var("MEMNET_SERVER__PORT");
        env::remove_var("MEMNET_STORAGE__BACKEND");
        env::remove_var("MEMNET_SCORING__BASE_THRESHOLD");
    }
}

// Parse from a fixed argv so the test harness arguments never reach clap
fn load(extra: &[&str]) -> AppConfig {
    let mut args = vec!["memory-network"];
    args.extend_from_slice(extra);
    AppConfig::load_from_args(args).expect("Failed to load config")
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = load(&[]);
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.storage.backend, StorageBackend::File);
    assert_eq!(config.storage.path, "data/memories.json");
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Fastembed);
    assert!((config.scoring.base_threshold - 0.35).abs() < f32::EPSILON);
    assert!((config.scoring.network_threshold - 0.4).abs() < f32::EPSILON);
    assert_eq!(config.scoring.default_top_k, 10);
    assert_eq!(config.dedupe.window_secs, 5);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("MEMNET_SERVER__PORT", "9090");
        env::set_var("MEMNET_STORAGE__BACKEND", "surreal");
        env::set_var("MEMNET_SCORING__BASE_THRESHOLD", "0.5");
    }

    let config = load(&[]);
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.storage.backend, StorageBackend::Surreal);
    assert!((config.scoring.base_threshold - 0.5).abs() < f32::EPSILON);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_beats_env() {
    clear_env_vars();
    unsafe {
        env::set_var("MEMNET_SERVER__PORT", "9090");
    }

    let config = load(&[
        "--port",
        "4040",
        "--storage-path",
        "/tmp/elsewhere.json",
        "--embedding-provider",
        "hashed",
    ]);
    assert_eq!(config.server.port, 4040);
    assert_eq!(config.storage.path, "/tmp/elsewhere.json");
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hashed);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let config_content = r#"
server:
  port: 7070
scoring:
  default_top_k: 25
embedding:
  provider: hashed
  dimension: 256
    "#;

    let dir = tempfile::TempDir::new().unwrap();
    let file_path = dir.path().join("memnet.yaml");
    fs::write(&file_path, config_content).expect("Failed to write temp config");

    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = load(&[]);
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.scoring.default_top_k, 25);
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hashed);
    assert_eq!(config.embedding.dimension, 256);
    // untouched keys keep their defaults
    assert_eq!(config.dedupe.window_secs, 5);

    clear_env_vars();
}

#[test]
#[serial]
fn test_unknown_backend_rejected() {
    clear_env_vars();
    unsafe {
        env::set_var("MEMNET_STORAGE__BACKEND", "postgres");
    }

    let result = AppConfig::load_from_args(["memory-network"]);
    assert!(result.is_err());

    clear_env_vars();
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    let config_content = r#"
server:
  port: 6060
    "#;
    let cwd_path = "config.yaml";
    fs::write(cwd_path, config_content).expect("Failed to write ./config.yaml");

    let result = std::panic::catch_unwind(|| {
        let config = load(&[]);
        assert_eq!(config.server.port, 6060);
    });

    fs::remove_file(cwd_path).unwrap();

    if let Err(e) = result {
        std::panic::resume_unwind(e);
    }
}
