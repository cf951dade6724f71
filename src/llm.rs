// src/llm.rs
//! Chat-completion client for post generation.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::error::{BotError, BotResult};
use crate::prompt::SYSTEM_PROMPT;

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 1500,
            temperature: 0.7,
            top_p: 0.9,
            frequency_penalty: 0.3,
            presence_penalty: 0.2,
        }
    }
}

type Extractor = fn(&Value) -> Option<&str>;

fn from_chat_choices(v: &Value) -> Option<&str> {
    v.get("choices")?.get(0)?.get("message")?.get("content")?.as_str()
}

fn from_output(v: &Value) -> Option<&str> {
    v.get("output")?.as_str()
}

fn from_text(v: &Value) -> Option<&str> {
    v.get("text")?.as_str()
}

/// Response shapes we understand, tried in order.
const EXTRACTORS: [(&str, Extractor); 3] = [
    ("choices[0].message.content", from_chat_choices),
    ("output", from_output),
    ("text", from_text),
];

/// First matching extractor wins.
pub fn extract_text(body: &Value) -> Option<&str> {
    EXTRACTORS.iter().find_map(|(_, f)| f(body))
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    default_model: String,
    timeout: Duration,
    params: SamplingParams,
}

impl LlmClient {
    pub fn new(http: reqwest::Client, cfg: &BotConfig) -> Self {
        Self {
            http,
            api_url: cfg.llm_api_url.clone(),
            api_key: cfg.llm_api_key.clone(),
            default_model: cfg.llm_model.clone(),
            timeout: cfg.llm_timeout,
            params: SamplingParams::default(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate text for `prompt`. `model` falls back to the configured default.
    ///
    /// The whole exchange (send + body read) runs under one wall-clock timeout;
    /// a hang is a single failed attempt and is not retried here.
    pub async fn generate(&self, prompt: &str, model: Option<&str>) -> BotResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BotError::config("LLM API key is not configured"))?;
        let model = model.unwrap_or(&self.default_model);

        debug!(target: "llm", model, prompt_chars = prompt.chars().count(), "requesting completion");
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.call(api_key, model, prompt)).await {
            Ok(r) => r,
            Err(_) => Err(BotError::Timeout(self.timeout)),
        };
        histogram!("llm_latency_ms").record(started.elapsed().as_millis() as f64);

        match &result {
            Ok(text) => {
                counter!("llm_requests_total", "outcome" => "ok").increment(1);
                debug!(target: "llm", model, chars = text.chars().count(), "completion received");
            }
            Err(e) => {
                counter!("llm_requests_total", "outcome" => e.kind()).increment(1);
                warn!(target: "llm", model, error = %e, "completion failed");
            }
        }
        result
    }

    async fn call(&self, api_key: &str, model: &str, prompt: &str) -> BotResult<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            #[serde(flatten)]
            params: SamplingParams,
        }

        let req = Req {
            model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            params: self.params,
        };

        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let raw = resp.text().await?;
        let body: Value = serde_json::from_str(&raw)
            .map_err(|e| BotError::UnexpectedFormat(format!("LLM response is not JSON: {e}")))?;
        extract_text(&body)
            .map(|t| t.trim().to_string())
            .ok_or_else(|| {
                BotError::UnexpectedFormat(format!(
                    "no generated text in LLM response (looked for {})",
                    EXTRACTORS.map(|(name, _)| name).join(", ")
                ))
            })
    }
}
