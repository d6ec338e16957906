use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use tracing::{info, warn};

use crate::RagError;
use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::OllamaClient;
use crate::indexer::Indexer;
use crate::loader::DatasetPreset;
use crate::loader::selector::Selector;
use crate::query::{QueryRequest, RecommendationService};

/// Pick the selector for `path`
///
/// An explicit expression wins over a preset. Without either, files whose name
/// mentions operation hours use that preset and everything else is treated as
/// a wait-times file.
#[inline]
pub fn resolve_selector(
    path: &Path,
    dataset: Option<DatasetPreset>,
    expression: Option<&str>,
) -> Result<Selector> {
    if let Some(expression) = expression {
        return Selector::parse(expression)
            .with_context(|| format!("Invalid selector '{}'", expression));
    }

    let preset = dataset.unwrap_or_else(|| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("operation_hours") || name.contains("operation-hours") {
            DatasetPreset::OperationHours
        } else {
            DatasetPreset::WaitTimes
        }
    });

    Ok(preset.selector())
}

/// Load, embed and store a dataset file
#[inline]
pub async fn index_dataset(
    config: &Config,
    path: &Path,
    selector: Selector,
    replace: bool,
) -> Result<()> {
    let mut indexer = Indexer::new(config).context("Failed to initialize indexer")?;

    let stats = indexer.index_file(path, selector, replace).await?;

    if stats.documents_loaded == 0 {
        println!("No documents matched in {}", path.display());
        return Ok(());
    }

    println!(
        "{} Indexed {} documents from {}",
        style("✓").green(),
        stats.embeddings_stored,
        path.display()
    );
    if stats.previously_stored > 0 {
        println!(
            "  Appended to {} existing documents (use --replace to start over)",
            stats.previously_stored
        );
    }
    println!(
        "  Vector store: {}",
        style(config.vector_database_path().display()).dim()
    );

    Ok(())
}

/// Run the HTTP service, optionally overriding the configured address
#[inline]
pub async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.set_port(port)?;
    }
    config
        .server
        .validate()
        .context("Invalid server address")?;

    if config.llm.api_key.is_none() {
        warn!(
            "{} is not set; recommendations will fail until it is",
            config.llm.api_key_env
        );
    }

    crate::server::serve(config).await
}

/// Run the recommendation pipeline once and print the answer
#[inline]
pub async fn ask(config: &Config, data: String, question: Option<String>) -> Result<()> {
    let service = RecommendationService::from_config(config).await?;

    let request = QueryRequest { data, question };
    let recommendation = service.recommend(&request).await?;

    println!("{}", recommendation.message);
    Ok(())
}

/// Report collaborator health and the number of stored documents
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Triage RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();
    println!("Config directory: {}", config.get_base_dir().display());
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            let client = client.with_retry_attempts(1);
            match tokio::task::spawn_blocking(move || client.health_check()).await {
                Ok(Ok(())) => {
                    println!(
                        "   ✅ Ollama: Connected ({}:{})",
                        config.ollama.host, config.ollama.port
                    );
                    println!("   📋 Model: {}", config.ollama.model);
                    println!("   🔢 Batch Size: {}", config.ollama.batch_size);
                }
                Ok(Err(e)) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
                Err(e) => println!("   ❌ Ollama: Health check aborted - {}", e),
            }
        }
        Err(e) => println!("   ❌ Ollama: Invalid configuration - {:#}", e),
    }

    println!();
    println!("🧠 Language Model:");
    println!("   📋 Model: {}", config.llm.model);
    if config.llm.api_key.is_some() {
        println!("   ✅ API key: set ({})", config.llm.api_key_env);
    } else {
        println!("   ❌ API key: missing (set {})", config.llm.api_key_env);
    }

    println!();
    println!("🔍 Vector Store:");
    match VectorStore::open(config).await {
        Ok(store) => match store.count_embeddings().await {
            Ok(count) => {
                println!("   ✅ LanceDB: {} documents", count);
                println!("   🔢 Dimension: {}", store.vector_dimension());
            }
            Err(e) => println!("   ⚠️  LanceDB: Opened but unreadable - {}", e),
        },
        Err(RagError::StoreNotFound(path)) => {
            println!("   ❌ LanceDB: Not created yet at {}", path.display());
            println!("   Run 'triage-rag index <file>' to build it.");
        }
        Err(e) => println!("   ❌ LanceDB: Failed to open - {}", e),
    }

    info!("Status report complete");
    Ok(())
}
