// In-memory collaborators for pipeline and router tests

use std::sync::Mutex;

use async_trait::async_trait;

use crate::database::{SearchResult, StoredDocument};
use crate::embeddings::Embedder;
use crate::llm::TextGenerator;
use crate::query::Retriever;
use crate::{RagError, Result};

pub(crate) fn search_result(content: &str, seq_num: u32, distance: f32) -> SearchResult {
    SearchResult {
        document: StoredDocument {
            content: content.to_string(),
            source: "waittimes.json".to_string(),
            seq_num,
            created_at: "2025-01-01T00:00:00Z".to_string(),
        },
        distance,
        similarity_score: 1.0 - distance,
    }
}

#[derive(Default)]
pub(crate) struct FakeEmbedder {
    pub(crate) queries: Mutex<Vec<String>>,
    pub(crate) fail: bool,
}

impl Embedder for FakeEmbedder {
    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if self.fail {
            anyhow::bail!("embedding service unavailable");
        }
        self.queries
            .lock()
            .expect("queries lock should not be poisoned")
            .push(text.to_string());
        Ok(vec![1.0, 0.0, 0.0])
    }

    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_query(text)).collect()
    }
}

#[derive(Default)]
pub(crate) struct FakeRetriever {
    pub(crate) results: Vec<SearchResult>,
    pub(crate) limits: Mutex<Vec<usize>>,
    pub(crate) missing: bool,
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, _query_vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if self.missing {
            return Err(RagError::StoreNotFound("/nonexistent/vectors".into()));
        }
        self.limits
            .lock()
            .expect("limits lock should not be poisoned")
            .push(limit);
        Ok(self.results.iter().take(limit).cloned().collect())
    }
}

pub(crate) struct FakeGenerator {
    pub(crate) reply: Option<String>,
    pub(crate) calls: Mutex<Vec<(String, String)>>,
}

impl FakeGenerator {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl TextGenerator for FakeGenerator {
    fn generate(&self, system_instruction: &str, prompt: &str) -> anyhow::Result<String> {
        self.calls
            .lock()
            .expect("calls lock should not be poisoned")
            .push((system_instruction.to_string(), prompt.to_string()));
        self.reply
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model returned no candidates"))
    }
}
