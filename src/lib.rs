use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Vector store not found at {}; run `triage-rag index` first", .0.display())]
    StoreNotFound(PathBuf),

    #[error("Vector store holds no documents; run `triage-rag index` first")]
    EmptyStore,

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Selector error: {0}")]
    Selector(#[from] loader::selector::SelectorError),

    #[error("Loader error: {0}")]
    Loader(#[from] loader::LoaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod http;
pub mod indexer;
pub mod llm;
pub mod loader;
pub mod query;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;
