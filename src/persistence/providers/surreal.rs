use crate::domain::Memory;
use crate::error::StorageError;
use crate::persistence::MemoryRepository;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use tracing::debug;

const TABLE: &str = "memories";

#[derive(Debug)]
pub struct SurrealDbRepository {
    db: Surreal<Any>,
    connection_string: String,
}

impl SurrealDbRepository {
    pub async fn new(
        connection_string: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, StorageError> {
        let db = connect(connection_string).await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(Self {
            db,
            connection_string: connection_string.to_string(),
        })
    }
}

// Surreal owns the `id` field (a record link), so the memory id travels as
// `memory_id`; `position` keeps insertion order across round trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryRecord {
    memory_id: String,
    content: String,
    score: f64,
    tags: Vec<String>,
    created: String,
    position: u64,
}

impl MemoryRecord {
    fn from_memory(position: usize, memory: &Memory) -> Self {
        Self {
            memory_id: memory.id.clone(),
            content: memory.content.clone(),
            score: memory.score,
            tags: memory.tags.clone(),
            created: memory.created.format("%Y-%m-%d").to_string(),
            position: position as u64,
        }
    }

    fn into_memory(self) -> Result<Memory, StorageError> {
        let created = NaiveDate::parse_from_str(&self.created, "%Y-%m-%d").map_err(|e| {
            StorageError::Corrupt(format!(
                "memory {} has invalid date {:?}: {e}",
                self.memory_id, self.created
            ))
        })?;
        Ok(Memory {
            id: self.memory_id,
            content: self.content,
            score: self.score.max(0.0),
            tags: self.tags,
            created,
        })
    }
}

#[async_trait]
impl MemoryRepository for SurrealDbRepository {
    async fn load(&self) -> Result<Vec<Memory>, StorageError> {
        let mut records: Vec<MemoryRecord> = self.db.select(TABLE).await?;
        records.sort_by_key(|r| r.position);
        debug!(count = records.len(), "Loaded memories from SurrealDB");
        records.into_iter().map(MemoryRecord::into_memory).collect()
    }

    async fn save_all(&self, memories: &[Memory]) -> Result<(), StorageError> {
        let records: Vec<MemoryRecord> = memories
            .iter()
            .enumerate()
            .map(|(i, m)| MemoryRecord::from_memory(i, m))
            .collect();

        // Replace the table in one transaction so readers never see a partial set.
        let response = if records.is_empty() {
            self.db.query(format!("DELETE {TABLE};")).await?
        } else {
            self.db
                .query(format!(
                    "BEGIN TRANSACTION; DELETE {TABLE}; INSERT INTO {TABLE} $records; COMMIT TRANSACTION;"
                ))
                .bind(("records", records))
                .await?
        };
        response.check()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("surrealdb:{}", self.connection_string)
    }
}
