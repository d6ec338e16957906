use super::*;
use crate::RagError;
use crate::loader::DatasetPreset;
use crate::test_support::FakeEmbedder;
use std::path::PathBuf;
use tempfile::TempDir;

const WAITTIMES: &str = r#"{
    "Calgary": {
        "Emergency": [{"name": "Rockyview"}, {"name": "Foothills"}],
        "Urgent": [{"name": "South Calgary"}]
    },
    "Edmonton": {"Emergency": [{"name": "Royal Alexandra"}]}
}"#;

struct ShortEmbedder;

impl Embedder for ShortEmbedder {
    fn embed_query(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![1.0])
    }

    fn embed_documents(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(vec![vec![1.0]])
    }
}

fn create_test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama.batch_size = 2;
    config
}

fn write_dataset(temp_dir: &TempDir, contents: &str) -> PathBuf {
    let path = temp_dir.path().join("waittimes.json");
    std::fs::write(&path, contents).expect("should write dataset");
    path
}

fn create_test_indexer(config: &Config) -> Indexer {
    Indexer::with_embedder(config, Arc::new(FakeEmbedder::default()))
}

async fn open_store(config: &Config) -> VectorStore {
    VectorStore::open(config)
        .await
        .expect("store should exist after indexing")
}

async fn assert_no_store(config: &Config) {
    assert!(matches!(
        VectorStore::open(config).await,
        Err(RagError::StoreNotFound(_))
    ));
}

#[tokio::test]
async fn indexer_creation_touches_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);

    let indexer = create_test_indexer(&config);
    assert_eq!(indexer.batch_size, 2);
    assert!(indexer.vector_store().is_none());
    assert!(!config.vector_database_path().exists());
}

#[tokio::test]
async fn single_entry_yields_one_document() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(
        &temp_dir,
        r#"{"Calgary": {"Emergency": [{"name": "Rockyview"}], "Urgent": []}}"#,
    );

    let mut indexer = create_test_indexer(&config);
    let stats = indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect("should index file");

    assert_eq!(stats.documents_loaded, 1);
    assert_eq!(stats.embeddings_stored, 1);
    assert_eq!(stats.previously_stored, 0);

    let results = open_store(&config)
        .await
        .search_similar(&[1.0, 0.0, 0.0], 3)
        .await
        .expect("should search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.content, r#"{"name": "Rockyview"}"#);
    assert_eq!(results[0].document.seq_num, 1);
    assert_eq!(results[0].document.source, path.display().to_string());
}

#[tokio::test]
async fn documents_are_embedded_in_batches() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(&temp_dir, WAITTIMES);

    let embedder = Arc::new(FakeEmbedder::default());
    let mut indexer = Indexer::with_embedder(&config, Arc::clone(&embedder) as Arc<dyn Embedder>);

    let stats = indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect("should index file");

    assert_eq!(stats.documents_loaded, 4);
    assert_eq!(stats.embeddings_stored, 4);
    assert_eq!(embedder.queries.lock().expect("lock").len(), 4);
    assert_eq!(
        open_store(&config)
            .await
            .count_embeddings()
            .await
            .expect("should count"),
        4
    );
}

#[tokio::test]
async fn reindexing_appends_duplicates() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(&temp_dir, WAITTIMES);

    let mut indexer = create_test_indexer(&config);
    indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect("first run should succeed");
    let stats = indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect("second run should succeed");

    assert_eq!(stats.previously_stored, 4);
    assert_eq!(
        open_store(&config)
            .await
            .count_embeddings()
            .await
            .expect("should count"),
        8
    );
}

#[tokio::test]
async fn replace_starts_over() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(&temp_dir, WAITTIMES);

    let mut indexer = create_test_indexer(&config);
    indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect("first run should succeed");
    let stats = indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), true)
        .await
        .expect("replace run should succeed");

    assert_eq!(stats.previously_stored, 0);
    assert_eq!(
        open_store(&config)
            .await
            .count_embeddings()
            .await
            .expect("should count"),
        4
    );
}

#[tokio::test]
async fn empty_selection_stores_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(&temp_dir, r#"{"Calgary": {"Emergency": []}}"#);

    let mut indexer = create_test_indexer(&config);
    let stats = indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect("empty selection is not an error");

    assert_eq!(stats, IndexingStats::default());
    assert_no_store(&config).await;
}

#[tokio::test]
async fn missing_file_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);

    let mut indexer = create_test_indexer(&config);
    let result = indexer
        .index_file(
            &temp_dir.path().join("missing.json"),
            DatasetPreset::WaitTimes.selector(),
            false,
        )
        .await;
    assert!(result.is_err());
    assert!(indexer.vector_store().is_none());
    assert_no_store(&config).await;
}

#[tokio::test]
async fn malformed_json_leaves_no_store() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(&temp_dir, r#"{"Calgary": {"Emergency": ["#);

    let mut indexer = create_test_indexer(&config);
    indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect_err("malformed json should fail");
    assert_no_store(&config).await;
}

#[tokio::test]
async fn embedder_failure_aborts() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(&temp_dir, WAITTIMES);

    let embedder = FakeEmbedder {
        fail: true,
        ..FakeEmbedder::default()
    };
    let mut indexer = Indexer::with_embedder(&config, Arc::new(embedder));

    let err = indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect_err("embedding failure should abort");
    assert!(format!("{:#}", err).contains("unavailable"));
    assert_no_store(&config).await;
}

#[tokio::test]
async fn vector_count_mismatch_aborts() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(&temp_dir, WAITTIMES);

    let mut indexer = Indexer::with_embedder(&config, Arc::new(ShortEmbedder));

    let result = indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await;
    assert!(result.is_err());
    assert_no_store(&config).await;
}

#[tokio::test]
async fn failed_run_keeps_existing_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(&temp_dir, WAITTIMES);

    let mut indexer = create_test_indexer(&config);
    indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect("first run should succeed");

    let failing = FakeEmbedder {
        fail: true,
        ..FakeEmbedder::default()
    };
    let mut indexer = Indexer::with_embedder(&config, Arc::new(failing));
    indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), true)
        .await
        .expect_err("embedding failure should abort");

    assert_eq!(
        open_store(&config)
            .await
            .count_embeddings()
            .await
            .expect("should count"),
        4
    );
}

#[tokio::test]
async fn replace_with_empty_selection_empties_existing_store() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let path = write_dataset(&temp_dir, WAITTIMES);

    let mut indexer = create_test_indexer(&config);
    indexer
        .index_file(&path, DatasetPreset::WaitTimes.selector(), false)
        .await
        .expect("first run should succeed");

    let empty = write_dataset(&temp_dir, r#"{"Calgary": {"Emergency": []}}"#);
    let mut indexer = create_test_indexer(&config);
    indexer
        .index_file(&empty, DatasetPreset::WaitTimes.selector(), true)
        .await
        .expect("empty selection is not an error");

    assert_eq!(
        open_store(&config)
            .await
            .count_embeddings()
            .await
            .expect("should count"),
        0
    );
}
