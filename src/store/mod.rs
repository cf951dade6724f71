// src/store/mod.rs
//! Key-value storage capability. Values are JSON strings under fixed keys;
//! callers own read-modify-write and there is no optimistic concurrency.

pub mod file;
pub mod memory;

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::error::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

pub const KEY_QUEUE: &str = "queue";
pub const KEY_FOOTER: &str = "post_footer";
pub const KEY_STATS: &str = "posting_stats";

#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

pub type DynStore = Arc<dyn KvStore>;

/// Read a JSON value. Absent keys and undecodable blobs both yield `None`;
/// a corrupt blob is logged, not surfaced.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!(target: "store", key, error = %e, "stored value is not valid JSON; using defaults");
            Ok(None)
        }
    }
}

pub async fn put_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.put(key, raw).await
}
