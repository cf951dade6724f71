// tests/telegram_publisher.rs
//
// Publisher state machine against a mock Bot API:
// image + reply, plain-text reply fallback, text-only fallback,
// complete failure, reply failure after the image is out, 429 handling.

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use trading_edu_bot::config::{BotConfig, FileDefaults};
use trading_edu_bot::image::ImageResolver;
use trading_edu_bot::telegram::{PublishOutcome, TelegramPublisher, PHOTO_CAPTION};
use trading_edu_bot::BotError;

const TOKEN: &str = "1234567890:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsawxyz";

fn ok_message(id: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": { "message_id": id } }))
}

fn bad_request(desc: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({ "ok": false, "description": desc }))
}

fn method_path(m: &str) -> String {
    format!("/bot{TOKEN}/{m}")
}

async fn mount_image_probe(server: &MockServer) {
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/jpeg"))
        .mount(server)
        .await;
}

fn publisher_for(server: &MockServer) -> TelegramPublisher {
    let base = server.uri();
    let cfg = BotConfig::from_sources(
        |k| match k {
            "TELEGRAM_BOT_TOKEN" => Some(TOKEN.to_string()),
            "TELEGRAM_CHAT_ID" => Some("@lessons".to_string()),
            "TELEGRAM_API_BASE" => Some(base.clone()),
            "HTTP_RETRY_BASE_MS" => Some("1".to_string()),
            _ => None,
        },
        FileDefaults::default(),
    );
    let images = ImageResolver::new(reqwest::Client::new(), format!("{base}/img/?q="))
        .with_backups(vec![format!("{base}/backup.jpg")]);
    TelegramPublisher::new(reqwest::Client::new(), &cfg, images)
}

fn image_url(p: &TelegramPublisher) -> String {
    p.images().build_url(&["crypto", "trading", "finance"])
}

fn json_body(req: &Request) -> Value {
    serde_json::from_slice(&req.body).expect("request body is JSON")
}

#[tokio::test]
async fn image_then_html_reply() {
    let server = MockServer::start().await;
    mount_image_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(method_path("sendPhoto")))
        .respond_with(ok_message(10))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .and(body_partial_json(json!({ "parse_mode": "HTML", "reply_to_message_id": 10 })))
        .respond_with(ok_message(11))
        .expect(1)
        .mount(&server)
        .await;

    let p = publisher_for(&server);
    let outcome = p.publish("<b>Lesson</b> body", &image_url(&p)).await.unwrap();
    assert_eq!(
        outcome,
        PublishOutcome::ImageWithReply {
            photo_message_id: 10,
            reply_message_id: 11
        }
    );

    let requests = server.received_requests().await.unwrap();
    let photo = requests
        .iter()
        .find(|r| r.url.path().ends_with("/sendPhoto"))
        .expect("sendPhoto request");
    let body = json_body(photo);
    assert_eq!(body["chat_id"], "@lessons");
    assert_eq!(body["caption"], PHOTO_CAPTION);
    assert!(body["photo"].as_str().unwrap().contains("crypto%2Ctrading%2Cfinance"));
}

#[tokio::test]
async fn photo_failure_falls_back_to_text_only() {
    let server = MockServer::start().await;
    mount_image_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(method_path("sendPhoto")))
        .respond_with(bad_request("Bad Request: wrong file identifier"))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .respond_with(ok_message(20))
        .expect(1)
        .mount(&server)
        .await;

    let p = publisher_for(&server);
    let outcome = p.publish("body", &image_url(&p)).await.unwrap();
    match outcome {
        PublishOutcome::TextOnly { message_id, image_error } => {
            assert_eq!(message_id, 20);
            assert!(image_error.contains("400"), "image error: {image_error}");
        }
        other => panic!("expected TextOnly, got {other:?}"),
    }
}

#[tokio::test]
async fn photo_and_text_failing_is_complete_failure() {
    let server = MockServer::start().await;
    mount_image_probe(&server).await;
    Mock::given(method("POST"))
        .respond_with(bad_request("Bad Request: chat not found"))
        .mount(&server)
        .await;

    let p = publisher_for(&server);
    let err = p.publish("body", &image_url(&p)).await.unwrap_err();
    match err {
        BotError::CompletePostingFailure { image, text } => {
            assert!(image.contains("chat not found"));
            assert!(text.contains("chat not found"));
        }
        other => panic!("expected CompletePostingFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_html_reply_is_resent_as_plain_text() {
    let server = MockServer::start().await;
    mount_image_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(method_path("sendPhoto")))
        .respond_with(ok_message(30))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .and(body_partial_json(json!({ "parse_mode": "HTML" })))
        .respond_with(bad_request("Bad Request: can't parse entities"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .respond_with(ok_message(31))
        .mount(&server)
        .await;

    let p = publisher_for(&server);
    let outcome = p
        .publish("<b>Title</b>\nUse a stop &amp; a target", &image_url(&p))
        .await
        .unwrap();
    match outcome {
        PublishOutcome::ImageWithPlainReply {
            photo_message_id,
            reply_message_id,
            html_error,
        } => {
            assert_eq!(photo_message_id, 30);
            assert_eq!(reply_message_id, 31);
            assert!(html_error.contains("can't parse entities"));
        }
        other => panic!("expected ImageWithPlainReply, got {other:?}"),
    }

    let requests = server.received_requests().await.unwrap();
    let plain = requests
        .iter()
        .filter(|r| r.url.path().ends_with("/sendMessage"))
        .map(json_body)
        .find(|b| b.get("parse_mode").is_none())
        .expect("plain-text reply");
    assert_eq!(plain["text"], "Title\nUse a stop & a target");
    assert_eq!(plain["reply_to_message_id"], 30);
}

#[tokio::test]
async fn reply_failure_keeps_the_image_post() {
    let server = MockServer::start().await;
    mount_image_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(method_path("sendPhoto")))
        .respond_with(ok_message(40))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let p = publisher_for(&server);
    let outcome = p.publish("body", &image_url(&p)).await.unwrap();
    assert!(
        matches!(outcome, PublishOutcome::ImageReplyFailed { photo_message_id: 40, .. }),
        "got {outcome:?}"
    );
}

#[tokio::test]
async fn rate_limit_is_retried_after_the_advertised_wait() {
    let server = MockServer::start().await;
    mount_image_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(method_path("sendPhoto")))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(method_path("sendPhoto")))
        .respond_with(ok_message(50))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .respond_with(ok_message(51))
        .mount(&server)
        .await;

    let p = publisher_for(&server);
    let outcome = p.publish("body", &image_url(&p)).await.unwrap();
    assert_eq!(outcome.mode(), "image_with_reply");

    let photo_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/sendPhoto"))
        .count();
    assert_eq!(photo_calls, 2);
}

#[tokio::test]
async fn malformed_token_is_a_config_error_without_requests() {
    let server = MockServer::start().await;
    let base = server.uri();
    let cfg = BotConfig::from_sources(
        |k| match k {
            "TELEGRAM_BOT_TOKEN" => Some("123:short".to_string()),
            "TELEGRAM_CHAT_ID" => Some("@lessons".to_string()),
            "TELEGRAM_API_BASE" => Some(base.clone()),
            _ => None,
        },
        FileDefaults::default(),
    );
    let images = ImageResolver::new(reqwest::Client::new(), &cfg.image_search_base);
    let p = TelegramPublisher::new(reqwest::Client::new(), &cfg, images);

    let err = p.publish("body", "https://img.test/x.jpg").await.unwrap_err();
    assert!(matches!(err, BotError::Config(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
