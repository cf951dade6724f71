// src/config/bot.rs
use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::image::DEFAULT_IMAGE_SEARCH_BASE;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/bot.toml";
pub const ENV_CONFIG_PATH: &str = "BOT_CONFIG_PATH";

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SCHEDULED_MODEL: &str = "gpt-4o";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POST_INTERVAL_SECS: u64 = 6 * 3600;
/// `STORE_DIR` value selecting the in-process store.
pub const MEMORY_STORE: &str = ":memory:";
const DEFAULT_STORE_DIR: &str = "data/kv";

/// Non-secret defaults that may live in `config/bot.toml`. Env vars win.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileDefaults {
    pub telegram_api_base: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub llm_api_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_scheduled_model: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub store_dir: Option<String>,
    pub post_interval_secs: Option<u64>,
    pub scheduler_enabled: Option<bool>,
    pub http_max_retries: Option<u32>,
    pub http_retry_base_ms: Option<u64>,
    pub image_search_base: Option<String>,
    pub backup_images: Option<Vec<String>>,
}

impl FileDefaults {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(toml::from_str(&data)?)
    }
}

/// Runtime configuration. Credentials stay optional here; components raise
/// `BotError::Config` when they need one that is missing.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api_base: String,

    pub llm_api_key: Option<String>,
    pub llm_api_url: String,
    pub llm_model: String,
    pub llm_scheduled_model: String,
    pub llm_timeout: Duration,

    pub admin_token: Option<String>,
    /// `None` keeps state in memory only.
    pub store_dir: Option<PathBuf>,

    pub post_interval: Duration,
    pub scheduler_enabled: bool,
    pub retry: RetryPolicy,

    pub image_search_base: String,
    /// Overrides the built-in backup rotation when set.
    pub backup_images: Option<Vec<String>>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self::from_sources(|_| None, FileDefaults::default())
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl BotConfig {
    /// Process env + optional TOML defaults file.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let file = if path.exists() {
            FileDefaults::load_from_file(&path)
                .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?
        } else {
            FileDefaults::default()
        };
        Ok(Self::from_sources(|k| env::var(k).ok(), file))
    }

    /// Build from a key lookup and file defaults. Unparseable numbers fall back
    /// to defaults.
    pub fn from_sources<F>(lookup: F, file: FileDefaults) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| non_blank(lookup(k));
        let num = |k: &str| get(k).and_then(|v| v.parse::<u64>().ok());

        let retry_default = RetryPolicy::default();
        let max_attempts = get("HTTP_MAX_RETRIES")
            .and_then(|v| v.parse::<u32>().ok())
            .or(file.http_max_retries)
            .unwrap_or(retry_default.max_attempts);
        let base_delay = num("HTTP_RETRY_BASE_MS")
            .or(file.http_retry_base_ms)
            .map(Duration::from_millis)
            .unwrap_or(retry_default.base_delay);

        Self {
            telegram_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID").or(non_blank(file.telegram_chat_id)),
            telegram_api_base: get("TELEGRAM_API_BASE")
                .or(file.telegram_api_base)
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),

            llm_api_key: get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            llm_api_url: get("LLM_API_URL")
                .or(file.llm_api_url)
                .unwrap_or_else(|| DEFAULT_LLM_API_URL.to_string()),
            llm_model: get("LLM_MODEL")
                .or(file.llm_model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_scheduled_model: get("LLM_SCHEDULED_MODEL")
                .or(file.llm_scheduled_model)
                .unwrap_or_else(|| DEFAULT_SCHEDULED_MODEL.to_string()),
            llm_timeout: Duration::from_secs(
                num("LLM_TIMEOUT_SECS")
                    .or(file.llm_timeout_secs)
                    .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
            ),

            admin_token: get("ADMIN_TOKEN"),
            store_dir: Some(
                get("STORE_DIR")
                    .or(file.store_dir)
                    .unwrap_or_else(|| DEFAULT_STORE_DIR.to_string()),
            )
            .filter(|d| d != MEMORY_STORE)
            .map(PathBuf::from),

            post_interval: Duration::from_secs(
                num("POST_INTERVAL_SECS")
                    .or(file.post_interval_secs)
                    .unwrap_or(DEFAULT_POST_INTERVAL_SECS)
                    .max(60),
            ),
            scheduler_enabled: get("SCHEDULER_ENABLED")
                .and_then(|v| parse_bool(&v))
                .or(file.scheduler_enabled)
                .unwrap_or(true),
            retry: RetryPolicy {
                max_attempts,
                base_delay,
                ..retry_default
            },

            image_search_base: get("IMAGE_SEARCH_BASE")
                .or(file.image_search_base)
                .unwrap_or_else(|| DEFAULT_IMAGE_SEARCH_BASE.to_string()),
            backup_images: file.backup_images.filter(|v| !v.is_empty()),
        }
    }
}
