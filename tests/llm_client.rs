// tests/llm_client.rs
//
// LLM client against a local mock server: response shapes, error mapping,
// and the wall-clock timeout.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trading_edu_bot::config::{BotConfig, FileDefaults};
use trading_edu_bot::llm::LlmClient;
use trading_edu_bot::BotError;

fn client_for(server: &MockServer, timeout_secs: &str) -> LlmClient {
    let url = format!("{}/v1/chat/completions", server.uri());
    let cfg = BotConfig::from_sources(
        |k| match k {
            "LLM_API_KEY" => Some("sk-test".to_string()),
            "LLM_API_URL" => Some(url.clone()),
            "LLM_TIMEOUT_SECS" => Some(timeout_secs.to_string()),
            _ => None,
        },
        FileDefaults::default(),
    );
    LlmClient::new(reqwest::Client::new(), &cfg)
}

#[tokio::test]
async fn chat_completion_text_is_trimmed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "  <b>RSI basics</b>\n  " } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server, "5")
        .generate("explain RSI", None)
        .await
        .expect("generate");
    assert_eq!(text, "<b>RSI basics</b>");
}

#[tokio::test]
async fn explicit_model_is_sent_in_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(wiremock::matchers::body_partial_json(json!({ "model": "gpt-4o" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "from output" })))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server, "5")
        .generate("p", Some("gpt-4o"))
        .await
        .expect("generate");
    assert_eq!(text, "from output");
}

#[tokio::test]
async fn text_shape_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "plain text" })))
        .mount(&server)
        .await;

    let text = client_for(&server, "5").generate("p", None).await.unwrap();
    assert_eq!(text, "plain text");
}

#[tokio::test]
async fn non_2xx_maps_to_upstream_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server, "5").generate("p", None).await.unwrap_err();
    match err {
        BotError::Upstream { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("overloaded"));
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_shape_is_unexpected_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "data": 1 } })))
        .mount(&server)
        .await;

    let err = client_for(&server, "5").generate("p", None).await.unwrap_err();
    assert!(matches!(err, BotError::UnexpectedFormat(_)), "got {err:?}");
}

#[tokio::test]
async fn non_json_body_is_unexpected_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server, "5").generate("p", None).await.unwrap_err();
    assert!(matches!(err, BotError::UnexpectedFormat(_)), "got {err:?}");
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "text": "late" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server, "1").generate("p", None).await.unwrap_err();
    assert!(matches!(err, BotError::Timeout(d) if d == Duration::from_secs(1)), "got {err:?}");
}

#[tokio::test]
async fn missing_key_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}/v1/chat/completions", server.uri());
    let cfg = BotConfig::from_sources(
        |k| (k == "LLM_API_URL").then(|| url.clone()),
        FileDefaults::default(),
    );
    let client = LlmClient::new(reqwest::Client::new(), &cfg);
    assert!(!client.has_api_key());
    let err = client.generate("p", None).await.unwrap_err();
    assert!(matches!(err, BotError::Config(_)));
}
