pub mod embedding;
pub mod engine;
pub mod graph;
pub mod keyword;
pub mod reinforcement;
pub mod scoring;

pub use embedding::{EmbeddingProvider, FastEmbedProvider, HashedEmbedder};
pub use engine::{EngineSettings, MemoryEngine};
pub use graph::{GraphInput, SimilarityGraph, SimilarityMatrix};
