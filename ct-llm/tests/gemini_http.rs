use ct_llm::{ChatMessage, ChatProvider, GeminiClient, LlmError, ModelConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new("test-key", ModelConfig::default()).with_base_url(server.uri())
}

#[tokio::test]
async fn generate_content_happy_path() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [
                { "role": "user", "parts": [{ "text": "oi" }] },
                { "role": "model", "parts": [{ "text": "Olá!" }] },
                { "role": "user", "parts": [{ "text": "quem é você?" }] }
            ],
            "generationConfig": { "topK": 64, "maxOutputTokens": 8192 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Sou um assistente." }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transcript = vec![
        ChatMessage::user("oi"),
        ChatMessage::model("Olá!"),
        ChatMessage::user("quem é você?"),
    ];
    let resp = client_for(&server)
        .send(&transcript)
        .await
        .expect("reply should succeed");

    assert_eq!(resp.message.content, "Sou um assistente.");
    assert_eq!(resp.usage.prompt_tokens, 12);
    assert_eq!(resp.usage.completion_tokens, 5);
}

#[tokio::test]
async fn non_success_status_surfaces_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .send(&[ChatMessage::user("oi")])
        .await
        .expect_err("quota error");

    match err {
        LlmError::Http(message) => {
            assert!(message.contains("429"));
            assert!(message.contains("RESOURCE_EXHAUSTED"));
        }
        other => panic!("expected http error, got {other:?}"),
    }
}

#[tokio::test]
async fn blocked_prompt_is_reported_as_blocked() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .send(&[ChatMessage::user("algo ofensivo")])
        .await
        .expect_err("blocked prompt");
    assert!(matches!(err, LlmError::Blocked(_)));
}

#[tokio::test]
async fn malformed_body_is_a_format_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .send(&[ChatMessage::user("oi")])
        .await
        .expect_err("malformed body");
    assert!(matches!(err, LlmError::ResponseFormat(_)));
}

#[tokio::test]
async fn unreachable_provider_is_an_http_error() {
    let err = GeminiClient::new("test-key", ModelConfig::default())
        .with_base_url("http://127.0.0.1:1")
        .send(&[ChatMessage::user("oi")])
        .await
        .expect_err("connection refused");
    assert!(matches!(err, LlmError::Http(_)));
}
