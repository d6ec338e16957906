// Indexer module
// Loads a JSON dataset, embeds each selected document and appends it to the vector store

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::RagError;
use crate::config::Config;
use crate::database::{EmbeddingRecord, StoredDocument, VectorStore};
use crate::embeddings::{Embedder, OllamaClient};
use crate::loader::selector::Selector;
use crate::loader::{Document, JsonDocumentLoader};

/// One-shot indexer writing into the on-disk vector store
///
/// The store is only created once a run has documents embedded and ready to
/// write, so a failed load or embedding leaves nothing on disk.
pub struct Indexer {
    config: Config,
    vector_store: Option<VectorStore>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

/// Statistics about one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub documents_loaded: usize,
    pub embeddings_stored: usize,
    /// Rows the store held before this run, after any reset
    pub previously_stored: u64,
}

impl Indexer {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let ollama_client =
            OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
        Ok(Self::with_embedder(config, Arc::new(ollama_client)))
    }

    #[inline]
    pub fn with_embedder(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config: config.clone(),
            vector_store: None,
            embedder,
            batch_size: (config.ollama.batch_size as usize).max(1),
        }
    }

    /// The store this indexer has written to, if any run reached it
    #[inline]
    pub fn vector_store(&self) -> Option<&VectorStore> {
        self.vector_store.as_ref()
    }

    /// Index every document `selector` picks out of the JSON file at `path`
    ///
    /// With `replace` the store is emptied first; otherwise documents are
    /// appended, so indexing the same file twice stores it twice.
    #[inline]
    pub async fn index_file(
        &mut self,
        path: &Path,
        selector: Selector,
        replace: bool,
    ) -> Result<IndexingStats> {
        info!(
            "Loading documents from {} with selector '{}'",
            path.display(),
            selector
        );

        let documents = JsonDocumentLoader::new(path, selector)
            .load()
            .with_context(|| format!("Failed to load documents from {}", path.display()))?;

        self.index_documents(&documents, replace).await
    }

    #[inline]
    pub async fn index_documents(
        &mut self,
        documents: &[Document],
        replace: bool,
    ) -> Result<IndexingStats> {
        let mut stats = IndexingStats {
            documents_loaded: documents.len(),
            ..IndexingStats::default()
        };

        if documents.is_empty() {
            warn!("Selector matched no documents; nothing to index");
            if replace {
                if let Some(store) = self.existing_store().await? {
                    store
                        .reset()
                        .await
                        .context("Failed to reset vector store")?;
                }
            }
            return Ok(stats);
        }

        let records = self.embed_documents(documents).await?;

        let store = self.writable_store().await?;
        if replace {
            store
                .reset()
                .await
                .context("Failed to reset vector store")?;
        }

        stats.previously_stored = store
            .count_embeddings()
            .await
            .context("Failed to count stored documents")?;
        if stats.previously_stored > 0 {
            warn!(
                "Vector store already holds {} documents; appending (use --replace to start over)",
                stats.previously_stored
            );
        }

        stats.embeddings_stored = records.len();
        store
            .store_embeddings_batch(records)
            .await
            .context("Failed to store embeddings")?;

        info!(
            "Indexed {} documents into {}",
            stats.embeddings_stored,
            store.path().display()
        );
        Ok(stats)
    }

    async fn embed_documents(&self, documents: &[Document]) -> Result<Vec<EmbeddingRecord>> {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(documents.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let created_at = Utc::now().to_rfc3339();
        let mut records = Vec::with_capacity(documents.len());

        for batch in documents.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            bar.set_message(format!("{} documents", texts.len()));

            let embedder = Arc::clone(&self.embedder);
            let embedded = tokio::task::spawn_blocking(move || embedder.embed_documents(&texts))
                .await
                .context("Embedding task failed")?;
            let vectors = match embedded {
                Ok(vectors) => vectors,
                Err(e) => {
                    bar.abandon();
                    return Err(e.context(format!(
                        "Failed to embed documents {}..={}",
                        batch[0].metadata.seq_num,
                        batch[batch.len() - 1].metadata.seq_num
                    )));
                }
            };

            if vectors.len() != batch.len() {
                bar.abandon();
                return Err(anyhow::anyhow!(
                    "Embedder returned {} vectors for {} documents",
                    vectors.len(),
                    batch.len()
                ));
            }

            records.extend(batch.iter().zip(vectors).map(|(document, vector)| {
                EmbeddingRecord::new(
                    vector,
                    StoredDocument::from_document(document, created_at.as_str()),
                )
            }));

            bar.inc(batch.len() as u64);
            debug!("Embedded {}/{} documents", records.len(), documents.len());
        }

        bar.finish_and_clear();
        Ok(records)
    }

    /// The store, created on first use
    async fn writable_store(&mut self) -> Result<&mut VectorStore> {
        let store = match self.vector_store.take() {
            Some(store) => store,
            None => VectorStore::create(&self.config)
                .await
                .context("Failed to initialize LanceDB vector store")?,
        };
        Ok(self.vector_store.insert(store))
    }

    /// The store if one already exists on disk; never creates it
    async fn existing_store(&mut self) -> Result<Option<&mut VectorStore>> {
        let store = match self.vector_store.take() {
            Some(store) => store,
            None => match VectorStore::open(&self.config).await {
                Ok(store) => store,
                Err(RagError::StoreNotFound(_)) => return Ok(None),
                Err(e) => return Err(e).context("Failed to open vector store"),
            },
        };
        Ok(Some(self.vector_store.insert(store)))
    }
}
