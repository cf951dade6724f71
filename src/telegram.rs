// src/telegram.rs
//! Telegram Bot API publisher.
//!
//! A post is an image with a short caption followed by the full text as a
//! threaded reply: photo captions are capped far below the text limit.
//!
//! ```text
//! validate params ──err──▶ Config error
//!   │
//! sendPhoto ──err──▶ sendMessage(HTML) ──ok──▶ TextOnly
//!   │ ok                       └──err──▶ CompletePostingFailure
//! reply(HTML) ──ok──▶ ImageWithReply
//!   │ err
//! reply(plain) ──ok──▶ ImageWithPlainReply
//!   └──err──▶ ImageReplyFailed (not an error: the image is already out)
//! ```

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::BotConfig;
use crate::error::{BotError, BotResult};
use crate::image::ImageResolver;
use crate::retry::{send_with_retry, RetryPolicy};
use crate::sanitize::strip_all_tags;

pub const PHOTO_CAPTION: &str = "📚 <b>New trading lesson</b>\n👇 Full breakdown in the reply below";

static RE_BOT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+:[A-Za-z0-9_-]+$").expect("bot token regex"));

/// `digits:secret`, longer than 40 characters overall.
pub fn is_valid_bot_token(token: &str) -> bool {
    token.len() > 40 && RE_BOT_TOKEN.is_match(token)
}

/// Terminal states of a publish that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PublishOutcome {
    ImageWithReply {
        photo_message_id: i64,
        reply_message_id: i64,
    },
    /// HTML reply was rejected; the reply went out as plain text.
    ImageWithPlainReply {
        photo_message_id: i64,
        reply_message_id: i64,
        html_error: String,
    },
    /// Image is posted but no reply could be sent.
    ImageReplyFailed {
        photo_message_id: i64,
        error: String,
    },
    TextOnly {
        message_id: i64,
        image_error: String,
    },
}

impl PublishOutcome {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::ImageWithReply { .. } => "image_with_reply",
            Self::ImageWithPlainReply { .. } => "image_with_plain_reply",
            Self::ImageReplyFailed { .. } => "image_reply_failed",
            Self::TextOnly { .. } => "text_only",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::ImageWithReply { photo_message_id, reply_message_id } => format!(
                "posted image #{photo_message_id} with reply #{reply_message_id}"
            ),
            Self::ImageWithPlainReply { photo_message_id, reply_message_id, .. } => format!(
                "posted image #{photo_message_id}; reply #{reply_message_id} sent as plain text after HTML was rejected"
            ),
            Self::ImageReplyFailed { photo_message_id, error } => format!(
                "posted image #{photo_message_id} but the text reply failed: {error}"
            ),
            Self::TextOnly { message_id, image_error } => format!(
                "posted text-only message #{message_id} (image failed: {image_error})"
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendPhoto<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TelegramPublisher {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    chat_id: Option<String>,
    retry: RetryPolicy,
    images: ImageResolver,
}

impl TelegramPublisher {
    pub fn new(http: reqwest::Client, cfg: &BotConfig, images: ImageResolver) -> Self {
        Self {
            http,
            api_base: cfg.telegram_api_base.trim_end_matches('/').to_string(),
            token: cfg.telegram_token.clone(),
            chat_id: cfg.telegram_chat_id.clone(),
            retry: cfg.retry,
            images,
        }
    }

    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    /// Token and chat id, validated.
    pub fn credentials(&self) -> BotResult<(&str, &str)> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| BotError::config("TELEGRAM_BOT_TOKEN is not set"))?;
        if !is_valid_bot_token(token) {
            return Err(BotError::config(
                "TELEGRAM_BOT_TOKEN is malformed (expected `<digits>:<secret>`)",
            ));
        }
        let chat_id = self
            .chat_id
            .as_deref()
            .ok_or_else(|| BotError::config("TELEGRAM_CHAT_ID is not set"))?;
        Ok((token, chat_id))
    }

    /// POST a Bot API method with retry; returns `result.message_id`.
    async fn call<T: Serialize>(&self, token: &str, method: &str, body: &T) -> BotResult<i64> {
        let url = format!("{}/bot{}/{}", self.api_base, token, method);
        let resp = send_with_retry(&self.retry, method, || self.http.post(&url).json(body)).await?;
        let v: Value = resp.json().await.map_err(|e| {
            BotError::UnexpectedFormat(format!("{method}: response is not JSON: {e}"))
        })?;
        if v.get("ok").and_then(Value::as_bool) != Some(true) {
            let desc = v
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("ok=false");
            return Err(BotError::UnexpectedFormat(format!("{method}: {desc}")));
        }
        v.pointer("/result/message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| BotError::UnexpectedFormat(format!("{method}: missing result.message_id")))
    }

    async fn send_message(
        &self,
        token: &str,
        chat_id: &str,
        text: &str,
        html: bool,
        reply_to: Option<i64>,
    ) -> BotResult<i64> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: html.then_some("HTML"),
            reply_to_message_id: reply_to,
        };
        self.call(token, "sendMessage", &body).await
    }

    /// Publish `caption` (sanitized HTML) with an illustration.
    pub async fn publish(&self, caption: &str, image_url: &str) -> BotResult<PublishOutcome> {
        let (token, chat_id) = self.credentials()?;

        let photo = self.images.resolve(image_url).await;
        let photo_body = SendPhoto {
            chat_id,
            photo: &photo,
            caption: PHOTO_CAPTION,
            parse_mode: "HTML",
        };
        let photo_id = match self.call(token, "sendPhoto", &photo_body).await {
            Ok(id) => id,
            Err(image_err) => {
                warn!(target: "telegram", error = %image_err, "photo post failed; falling back to text-only");
                return match self.send_message(token, chat_id, caption, true, None).await {
                    Ok(message_id) => {
                        counter!("telegram_posts_total", "mode" => "text_only").increment(1);
                        Ok(PublishOutcome::TextOnly {
                            message_id,
                            image_error: image_err.to_string(),
                        })
                    }
                    Err(text_err) => Err(BotError::CompletePostingFailure {
                        image: image_err.to_string(),
                        text: text_err.to_string(),
                    }),
                };
            }
        };
        info!(target: "telegram", photo_id, %photo, "photo posted");

        let outcome = match self
            .send_message(token, chat_id, caption, true, Some(photo_id))
            .await
        {
            Ok(reply_id) => PublishOutcome::ImageWithReply {
                photo_message_id: photo_id,
                reply_message_id: reply_id,
            },
            Err(html_err) => {
                warn!(target: "telegram", error = %html_err, "HTML reply rejected; retrying as plain text");
                let plain = strip_all_tags(caption);
                match self
                    .send_message(token, chat_id, &plain, false, Some(photo_id))
                    .await
                {
                    Ok(reply_id) => PublishOutcome::ImageWithPlainReply {
                        photo_message_id: photo_id,
                        reply_message_id: reply_id,
                        html_error: html_err.to_string(),
                    },
                    Err(plain_err) => {
                        warn!(target: "telegram", error = %plain_err, photo_id, "plain reply failed too; keeping the image post");
                        PublishOutcome::ImageReplyFailed {
                            photo_message_id: photo_id,
                            error: plain_err.to_string(),
                        }
                    }
                }
            }
        };
        counter!("telegram_posts_total", "mode" => outcome.mode()).increment(1);
        Ok(outcome)
    }

    /// Plain message, used by the admin test endpoint.
    pub async fn send_test_message(&self, text: &str) -> BotResult<i64> {
        let (token, chat_id) = self.credentials()?;
        self.send_message(token, chat_id, text, false, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_TOKEN: &str = "1234567890:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsawxyz";

    #[test]
    fn token_shape() {
        assert!(is_valid_bot_token(GOOD_TOKEN));
        assert!(!is_valid_bot_token("123:short"));
        assert!(!is_valid_bot_token("abc:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsawxyz12345"));
        assert!(!is_valid_bot_token("1234567890AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw"));
    }

    #[test]
    fn outcome_serializes_with_mode_tag() {
        let o = PublishOutcome::TextOnly {
            message_id: 7,
            image_error: "HTTP 400".into(),
        };
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["mode"], "text_only");
        assert_eq!(v["message_id"], 7);
        assert_eq!(o.mode(), "text_only");
        assert!(o.describe().contains("HTTP 400"));
    }

    #[test]
    fn missing_credentials_are_config_errors() {
        let cfg = BotConfig::default();
        let images = ImageResolver::new(reqwest::Client::new(), &cfg.image_search_base);
        let p = TelegramPublisher::new(reqwest::Client::new(), &cfg, images);
        assert!(matches!(p.credentials(), Err(BotError::Config(_))));
    }
}
