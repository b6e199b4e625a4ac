pub mod graph;
pub mod memory;

pub use graph::{EdgeStrength, NetworkEdge, NetworkNode, NetworkView};
pub use memory::{LlmContext, Memory, MemoryStats, ScoredMemory, SearchMode, SearchResults};
