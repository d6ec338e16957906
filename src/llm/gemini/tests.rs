use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

fn config_for(server: &MockServer) -> LlmConfig {
    LlmConfig {
        endpoint: server.uri(),
        api_key: Some("test-key".to_string()),
        ..LlmConfig::default()
    }
}

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new(&config_for(server))
        .expect("should create client")
        .with_retry_attempts(1)
}

fn text_response(parts: &[&str]) -> serde_json::Value {
    let parts: Vec<_> = parts.iter().map(|text| json!({"text": text})).collect();
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": parts},
            "finishReason": "STOP"
        }]
    })
}

#[test]
fn missing_api_key_is_rejected() {
    let config = LlmConfig::default();
    let err = GeminiClient::new(&config).expect_err("should require a key");
    assert!(err.to_string().contains("GEMINI_API_KEY"));
}

#[test]
fn url_targets_configured_model() {
    let config = LlmConfig {
        model: "gemini-2.5-pro".to_string(),
        api_key: Some("k".to_string()),
        ..LlmConfig::default()
    };
    let client = GeminiClient::new(&config).expect("should create client");
    assert_eq!(
        client.url.as_str(),
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
    );
    assert_eq!(client.model(), "gemini-2.5-pro");
}

#[test]
fn debug_output_hides_key() {
    let config = LlmConfig {
        api_key: Some("very-secret".to_string()),
        ..LlmConfig::default()
    };
    let client = GeminiClient::new(&config).expect("should create client");
    assert!(!format!("{:?}", client).contains("very-secret"));
}

#[tokio::test(flavor = "multi_thread")]
async fn sends_instruction_and_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "be helpful"}]},
            "contents": [{"role": "user", "parts": [{"text": "which hospital?"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response(&["Go to Rockyview."])))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server)
        .generate("be helpful", "which hospital?")
        .expect("should generate text");
    assert_eq!(text, "Go to Rockyview.");
}

#[tokio::test(flavor = "multi_thread")]
async fn joins_text_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(text_response(&["Go to Foothills. ", "Wait is 2h."])),
        )
        .mount(&server)
        .await;

    let text = client_for(&server)
        .generate("ctx", "q")
        .expect("should generate text");
    assert_eq!(text, "Go to Foothills. Wait is 2h.");
}

#[tokio::test(flavor = "multi_thread")]
async fn blocked_prompt_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .generate("ctx", "q")
        .expect_err("blocked prompt should fail");
    assert!(format!("{:#}", err).contains("SAFETY"));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_candidates_are_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    assert!(client_for(&server).generate("ctx", "q").is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_text_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}]
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .generate("ctx", "q")
        .expect_err("empty text should fail");
    assert!(format!("{:#}", err).contains("MAX_TOKENS"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server))
        .expect("should create client")
        .with_retry_attempts(3);
    assert!(client.generate("ctx", "q").is_err());
}
