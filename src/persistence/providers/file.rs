use crate::domain::Memory;
use crate::error::StorageError;
use crate::persistence::{MemoryRepository, parse_document, render_document};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// JSON file store with atomic replace.
///
/// Writes go to `<path>.tmp`, are read back and parsed, then renamed over the
/// primary file. The previous primary is kept as `<path>.backup` until the next
/// successful write. Writers are serialized by an in-process mutex.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> PathBuf {
        with_suffix(&self.path, ".tmp")
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, ".backup")
    }

    async fn non_empty(path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    async fn write_verified(&self, memories: &[Memory]) -> Result<(), StorageError> {
        let temp_path = self.temp_path();
        let content = render_document(memories)?;

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;
        drop(file);

        // Verify the temporary file before it replaces anything.
        let written = tokio::fs::read_to_string(&temp_path)
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;
        let parsed = parse_document(&written)?;
        if parsed.memories.len() != memories.len() {
            return Err(StorageError::Corrupt(format!(
                "verification read {} memories, expected {}",
                parsed.memories.len(),
                memories.len()
            )));
        }

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }

    async fn copy_backup_over_primary(&self) -> Result<bool, StorageError> {
        let backup_path = self.backup_path();
        if !Self::non_empty(&backup_path).await {
            return Ok(false);
        }
        tokio::fs::copy(&backup_path, &self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(true)
    }
}

#[async_trait]
impl MemoryRepository for JsonFileRepository {
    async fn load(&self) -> Result<Vec<Memory>, StorageError> {
        if !Self::non_empty(&self.path).await {
            info!(path = %self.path.display(), "No memory file found, starting empty store");
            self.save_all(&[]).await?;
            return Ok(Vec::new());
        }

        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;
        let parsed = parse_document(&text)?;

        if parsed.migrated {
            info!(
                count = parsed.memories.len(),
                "Migrated legacy category layout to flat memory list"
            );
            self.save_all(&parsed.memories).await?;
        }

        debug!(count = parsed.memories.len(), path = %self.path.display(), "Loaded memories");
        Ok(parsed.memories)
    }

    async fn save_all(&self, memories: &[Memory]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::io(parent, e))?;
            }
        }

        let backup_path = self.backup_path();
        if Self::non_empty(&self.path).await {
            tokio::fs::copy(&self.path, &backup_path)
                .await
                .map_err(|e| StorageError::io(&backup_path, e))?;
        }

        match self.write_verified(memories).await {
            Ok(()) => Ok(()),
            Err(write_err) => {
                let temp_path = self.temp_path();
                if tokio::fs::remove_file(&temp_path).await.is_err() {
                    debug!(path = %temp_path.display(), "No temporary file to clean up");
                }

                match self.copy_backup_over_primary().await {
                    Ok(restored) => {
                        if restored {
                            warn!(error = %write_err, "Restored memory file from backup after save error");
                        }
                        Err(write_err)
                    }
                    Err(restore_err) => Err(StorageError::RestoreFailed {
                        write: write_err.to_string(),
                        restore: restore_err.to_string(),
                    }),
                }
            }
        }
    }

    async fn restore_backup(&self) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let restored = self.copy_backup_over_primary().await?;
        if restored {
            warn!(path = %self.path.display(), "Memory file restored from backup");
        }
        Ok(restored)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_initializes_empty_store() {
        let dir = tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("data").join("memories.json"));

        let loaded = repo.load().await.unwrap();
        assert!(loaded.is_empty());

        let text = std::fs::read_to_string(repo.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["memories"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_save_keeps_one_backup_generation() {
        let dir = tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("memories.json"));

        let first = vec![Memory::new("first", vec![])];
        repo.save_all(&first).await.unwrap();
        assert!(!repo.backup_path().exists());

        let second = vec![first[0].clone(), Memory::new("second", vec!["x".into()])];
        repo.save_all(&second).await.unwrap();
        assert!(!repo.temp_path().exists());

        assert_eq!(repo.load().await.unwrap(), second);
        let backup = std::fs::read_to_string(repo.backup_path()).unwrap();
        assert_eq!(parse_document(&backup).unwrap().memories, first);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error_and_backup_restores() {
        let dir = tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("memories.json"));

        let good = vec![Memory::new("good", vec![])];
        repo.save_all(&good).await.unwrap();
        repo.save_all(&good).await.unwrap();

        std::fs::write(repo.path(), "{\"memories\": [trunc").unwrap();
        assert!(repo.load().await.is_err());

        assert!(repo.restore_backup().await.unwrap());
        assert_eq!(repo.load().await.unwrap(), good);
    }
}
