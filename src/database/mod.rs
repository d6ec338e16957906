// Vector persistence shared by the indexer and the query service

pub mod lancedb;

pub use lancedb::vector_store::{SearchResult, VectorStore};
pub use lancedb::{EmbeddingRecord, StoredDocument};
