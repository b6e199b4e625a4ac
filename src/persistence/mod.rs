use crate::domain::Memory;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod providers;

/// Durable home of the memory list.
///
/// The engine always reads and writes the whole collection; backends only need
/// to make `save_all` atomic.
#[async_trait]
pub trait MemoryRepository: Send + Sync + std::fmt::Debug {
    /// Load every stored memory in insertion order.
    async fn load(&self) -> Result<Vec<Memory>, StorageError>;

    /// Replace the stored collection.
    async fn save_all(&self, memories: &[Memory]) -> Result<(), StorageError>;

    /// Roll the primary copy back to the last backup generation, if the
    /// backend keeps one. Returns whether anything was restored.
    async fn restore_backup(&self) -> Result<bool, StorageError> {
        Ok(false)
    }

    /// Short human-readable backend label, e.g. `file:data/memories.json`.
    fn describe(&self) -> String;
}

// =========================================================================
// Serialized Document
// =========================================================================

/// On-disk layout: `{"memories": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub memories: Vec<Memory>,
}

/// A parsed document and whether it had to be migrated from the legacy
/// category layout.
#[derive(Debug)]
pub struct ParsedDocument {
    pub memories: Vec<Memory>,
    pub migrated: bool,
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    memories: Option<Vec<Memory>>,
    #[serde(default)]
    user_memories: Option<BTreeMap<String, Vec<LegacyMemory>>>,
}

// Old files grouped memories by category and carried a 1-10 weight.
#[derive(Deserialize)]
struct LegacyMemory {
    id: Option<String>,
    content: String,
    weight: Option<f64>,
    #[serde(default)]
    tags: Vec<String>,
    created: Option<String>,
}

impl LegacyMemory {
    fn into_memory(self) -> Memory {
        let mut memory = Memory::new(self.content, self.tags);
        if let Some(id) = self.id {
            memory.id = id;
        }
        memory.score = self.weight.unwrap_or(5.0) * 20.0;
        if let Some(date) = self
            .created
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        {
            memory.created = date;
        }
        memory
    }
}

/// Parse a serialized store, accepting the legacy layout.
pub fn parse_document(text: &str) -> Result<ParsedDocument, StorageError> {
    let raw: RawDocument = serde_json::from_str(text)?;

    let (mut memories, migrated) = match (raw.memories, raw.user_memories) {
        (Some(memories), _) => (memories, false),
        (None, Some(categories)) => (
            categories
                .into_values()
                .flatten()
                .map(LegacyMemory::into_memory)
                .collect(),
            true,
        ),
        (None, None) => {
            return Err(StorageError::Corrupt(
                "document has no `memories` list".to_string(),
            ));
        }
    };

    for memory in &mut memories {
        if !memory.score.is_finite() || memory.score < 0.0 {
            memory.score = 0.0;
        }
    }

    Ok(ParsedDocument { memories, migrated })
}

pub fn render_document(memories: &[Memory]) -> Result<String, StorageError> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        memories: &'a [Memory],
    }
    Ok(serde_json::to_string_pretty(&Borrowed { memories })?)
}
