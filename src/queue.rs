// src/queue.rs
//! Pending subjects awaiting generation, stored as an ordered JSON array under
//! the `queue` key. Items are removed outright once posted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{get_json, put_json, KvStore, KEY_QUEUE};

/// Trading domain used for prompts, hashtags and image keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Crypto,
    Forex,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Crypto, Market::Forex];

    pub fn as_str(self) -> &'static str {
        match self {
            Market::Crypto => "crypto",
            Market::Forex => "forex",
        }
    }

    /// Uniform pick, used when the queue is empty.
    pub fn random() -> Self {
        let idx = rand::rng().random_range(0..Self::ALL.len());
        Self::ALL[idx]
    }

    /// Topic name with the first letter capitalized (`Crypto`, `Forex`).
    pub fn hashtag(self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown market `{0}` (expected `crypto` or `forex`)")]
pub struct UnknownMarket(pub String);

impl FromStr for Market {
    type Err = UnknownMarket;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crypto" => Ok(Market::Crypto),
            "forex" => Ok(Market::Forex),
            other => Err(UnknownMarket(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub subject: String,
    pub market: Market,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub processed: bool,
}

fn new_item_id(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::rng().random();
    format!("{}-{:04x}", now.timestamp_millis(), suffix)
}

/// Whole queue in insertion order; absent key means empty.
pub async fn list(store: &dyn KvStore) -> Result<Vec<QueueItem>, StoreError> {
    Ok(get_json(store, KEY_QUEUE).await?.unwrap_or_default())
}

async fn save(store: &dyn KvStore, items: &[QueueItem]) -> Result<(), StoreError> {
    put_json(store, KEY_QUEUE, &items).await
}

/// Append a subject to the end of the queue.
pub async fn add_subject(
    store: &dyn KvStore,
    subject: &str,
    market: Market,
) -> Result<QueueItem, StoreError> {
    let now = Utc::now();
    let item = QueueItem {
        id: new_item_id(now),
        subject: subject.trim().to_string(),
        market,
        added_at: now,
        processed: false,
    };
    let mut items = list(store).await?;
    items.push(item.clone());
    save(store, &items).await?;
    Ok(item)
}

/// Oldest item not yet processed. Does not mutate the queue.
pub async fn next_unprocessed(store: &dyn KvStore) -> Result<Option<QueueItem>, StoreError> {
    Ok(list(store).await?.into_iter().find(|it| !it.processed))
}

/// Remove by id. Returns whether anything was removed.
pub async fn remove(store: &dyn KvStore, id: &str) -> Result<bool, StoreError> {
    let mut items = list(store).await?;
    let before = items.len();
    items.retain(|it| it.id != id);
    if items.len() == before {
        return Ok(false);
    }
    save(store, &items).await?;
    Ok(true)
}

pub async fn clear(store: &dyn KvStore) -> Result<(), StoreError> {
    store.delete(KEY_QUEUE).await
}
