pub mod ollama;

use anyhow::Result;

pub use ollama::{EmbeddingResult, OllamaClient};

/// Text to vector conversion used by the indexer and the query service
///
/// Implementations are blocking; async callers move them onto
/// `tokio::task::spawn_blocking`.
pub trait Embedder: Send + Sync {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
