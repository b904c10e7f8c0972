//! Persistence and retrieval implementations for agentexec.

pub mod in_memory;
pub mod knowledge;
pub mod noop;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use knowledge::KnowledgeBase;
pub use noop::NoopRetrieval;
pub use vector::{cosine_distance, cosine_similarity};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
