// LanceDB vector database module
// Holds one row per indexed document: its vector plus the text handed to the model


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::loader::Document;

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier for this embedding
    pub id: String,
    /// The vector embedding (384 dimensions for all-minilm)
    pub vector: Vec<f32>,
    pub metadata: StoredDocument,
}

/// Document text and provenance stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// The text used as retrieval context
    pub content: String,
    /// Path of the dataset file the document came from
    pub source: String,
    /// 1-based position of the document within its source
    pub seq_num: u32,
    /// RFC 3339 timestamp of when this embedding was created
    pub created_at: String,
}

impl StoredDocument {
    #[inline]
    pub fn from_document(document: &Document, created_at: impl Into<String>) -> Self {
        Self {
            content: document.content.clone(),
            source: document.metadata.source.clone(),
            seq_num: document.metadata.seq_num,
            created_at: created_at.into(),
        }
    }
}

impl EmbeddingRecord {
    /// New record with a random v4 id
    #[inline]
    pub fn new(vector: Vec<f32>, metadata: StoredDocument) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            metadata,
        }
    }
}
