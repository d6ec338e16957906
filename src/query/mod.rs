// Query module
// Retrieval-augmented recommendation pipeline behind `POST /` and `ask`


use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, RetrievalConfig};
use crate::database::{SearchResult, VectorStore};
use crate::embeddings::{Embedder, OllamaClient};
use crate::llm::{GeminiClient, TextGenerator};
use crate::{RagError, Result};

/// Fixed search text, also sent to the model as the user prompt
pub const DEFAULT_QUERY: &str = "Based on the user's data, give a recommendation on which \
emergency centre to go to and its wait time. Give some tips on how to tend to the injury or \
situation at home.";

pub const DEFAULT_CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Public Alberta Health Services wait-time page the model is pointed at
pub const WAIT_TIMES_URL: &str = "https://www.albertahealthservices.ca/waittimes/Page14230.aspx";

/// Nearest-neighbour lookup over indexed documents
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Free-form description of the caller's situation
    pub data: String,
    pub question: Option<String>,
}

impl QueryRequest {
    #[inline]
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            question: None,
        }
    }

    #[inline]
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub message: String,
}

/// Embeds the search text, retrieves context and asks the model
///
/// Collaborators are immutable once built, so one service is shared by all
/// requests.
pub struct RecommendationService {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn TextGenerator>,
    retrieval: RetrievalConfig,
}

impl RecommendationService {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn TextGenerator>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            retriever,
            generator,
            retrieval,
        }
    }

    /// Wire up Ollama, the on-disk store and Gemini from `config`
    ///
    /// Fails with `StoreNotFound` when nothing has been indexed yet.
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = VectorStore::open(config).await?;

        let embedder = OllamaClient::new(&config.ollama)
            .map_err(|e| RagError::Config(format!("{:#}", e)))?;
        let generator =
            GeminiClient::new(&config.llm).map_err(|e| RagError::Config(format!("{:#}", e)))?;

        info!(
            "Recommendation service ready (embedding model {}, language model {})",
            embedder.model(),
            generator.model()
        );

        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(store),
            Arc::new(generator),
            config.retrieval.clone(),
        ))
    }

    /// Text used for similarity search and as the model prompt
    #[inline]
    pub fn search_text<'a>(&'a self, request: &'a QueryRequest) -> &'a str {
        let question = request
            .question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());

        match question {
            Some(question) if self.retrieval.search_with_question => question,
            Some(question) => {
                debug!("Ignoring caller question: {}", question);
                &self.retrieval.query
            }
            None => &self.retrieval.query,
        }
    }

    #[inline]
    pub async fn recommend(&self, request: &QueryRequest) -> Result<Recommendation> {
        let search_text = self.search_text(request).to_string();

        let embedder = Arc::clone(&self.embedder);
        let text = search_text.clone();
        let query_vector = tokio::task::spawn_blocking(move || embedder.embed_query(&text))
            .await
            .map_err(|e| RagError::Other(e.into()))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let results = self
            .retriever
            .retrieve(&query_vector, self.retrieval.top_k)
            .await?;

        let Some(best) = results.first() else {
            warn!("No documents retrieved; refusing to answer without context");
            return Err(RagError::EmptyStore);
        };
        debug!(
            "Retrieved {} documents (best similarity {:.3})",
            results.len(),
            best.similarity_score
        );

        let context = build_context(&results, &self.retrieval.context_delimiter);
        let system_instruction = build_system_instruction(&context, &request.data);

        let generator = Arc::clone(&self.generator);
        let message = tokio::task::spawn_blocking(move || {
            generator.generate(&system_instruction, &search_text)
        })
        .await
        .map_err(|e| RagError::Other(e.into()))?
        .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        Ok(Recommendation { message })
    }
}

/// Document texts in rank order, separated by `delimiter`
#[inline]
pub fn build_context(results: &[SearchResult], delimiter: &str) -> String {
    results
        .iter()
        .map(|result| result.document.content.as_str())
        .collect::<Vec<_>>()
        .join(delimiter)
}

#[inline]
pub fn build_system_instruction(context: &str, data: &str) -> String {
    format!(
        "Take into consideration the following context: {context}. \
         The user's data is {data}. \
         You are a chat bot for an application that gives direct recommendations on what \
         individuals should do and where they should go in the medical emergency situation \
         that they are in. Use info from {WAIT_TIMES_URL}. \
         Give a waiting time for the recommended hospital."
    )
}
