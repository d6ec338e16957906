use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> OllamaConfig {
    let uri = Url::parse(&server.uri()).expect("mock server uri should parse");
    OllamaConfig {
        host: uri.host_str().expect("mock server has a host").to_string(),
        port: uri.port().expect("mock server has a port"),
        model: "all-minilm:latest".to_string(),
        batch_size: 2,
        ..OllamaConfig::default()
    }
}

fn client_for(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&config_for(server))
        .expect("should create client")
        .with_retry_attempts(1)
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        embedding_dimension: 384,
    };
    let client = OllamaClient::new(&config).expect("should create client");

    assert_eq!(client.model(), "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("should create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn model_name_normalization() {
    assert_eq!(normalize_model_name("all-minilm:latest"), "all-minilm");
    assert_eq!(normalize_model_name("all-minilm"), "all-minilm");
    assert_eq!(normalize_model_name("all-minilm:l6-v2"), "all-minilm:l6-v2");
}

#[tokio::test(flavor = "multi_thread")]
async fn single_embedding_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": "all-minilm:latest",
            "input": ["where is the nearest emergency room"]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.1, 0.2, 0.3]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client
        .generate_embedding("where is the nearest emergency room")
        .expect("should embed text");

    assert_eq!(result.embedding, vec![0.1, 0.2, 0.3]);
    assert_eq!(result.text, "where is the nearest emergency room");
}

#[tokio::test(flavor = "multi_thread")]
async fn batches_are_split_by_batch_size() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0], [2.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[3.0]]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let vectors = client
        .embed_documents(&texts)
        .expect("should embed all texts");

    assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn response_count_mismatch_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0]]})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts = vec!["a".to_string(), "b".to_string()];
    let err = client
        .generate_embeddings_batch(&texts)
        .expect_err("mismatched counts should fail");

    assert!(format!("{:#}", err).contains("Mismatch"));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_input_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let results = client
        .generate_embeddings_batch(&[])
        .expect("empty input should succeed");
    assert!(results.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "model not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server))
        .expect("should create client")
        .with_retry_attempts(3);

    assert!(client.embed_query("chest pain").is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_model_accepts_implicit_latest_tag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "all-minilm", "size": 45_960_996_u64, "digest": "1b22"},
                {"name": "llama3:8b"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let models = client.list_models().expect("should list models");
    assert_eq!(models.len(), 2);
    assert!(client.validate_model().is_ok());

    let missing = OllamaClient::new(&OllamaConfig {
        model: "nomic-embed-text".to_string(),
        ..config_for(&server)
    })
    .expect("should create client")
    .with_retry_attempts(1);
    assert!(missing.validate_model().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_pings_and_validates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "0.9.0"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"models": [{"name": "all-minilm:latest"}]})),
        )
        .mount(&server)
        .await;

    client_for(&server)
        .health_check()
        .expect("health check should pass");
}
