// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod footer;
pub mod image;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod prompt;
pub mod queue;
pub mod retry;
pub mod sanitize;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod telegram;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::BotConfig;
pub use crate::error::{BotError, BotResult};
pub use crate::pipeline::{Pipeline, PostReport};

use std::sync::Arc;

use crate::store::{DynStore, FileStore, MemoryStore};

/// Store selected by config: a directory-backed store when `store_dir` is set,
/// in-memory otherwise.
pub fn open_store(cfg: &BotConfig) -> anyhow::Result<DynStore> {
    match &cfg.store_dir {
        Some(dir) => {
            let store = FileStore::open(dir)
                .map_err(|e| anyhow::anyhow!("opening store at {}: {e}", dir.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Shared HTTP client for every outbound call.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("trading-edu-bot/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?)
}
