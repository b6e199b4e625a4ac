pub mod file;
pub mod surreal;

pub use file::JsonFileRepository;
pub use surreal::SurrealDbRepository;
