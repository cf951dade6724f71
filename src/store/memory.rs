// src/store/memory.rs
use std::collections::HashMap;
use std::sync::Mutex;

use super::KvStore;
use crate::error::StoreError;

/// In-process store. Used by tests and when no store directory is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let map = self.inner.lock().expect("memory store mutex poisoned");
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut map = self.inner.lock().expect("memory store mutex poisoned");
        map.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().expect("memory store mutex poisoned");
        map.remove(key);
        Ok(())
    }
}
