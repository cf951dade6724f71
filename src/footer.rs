// src/footer.rs
//! Promotional footer appended to generated posts.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::queue::Market;
use crate::store::{get_json, put_json, KvStore, KEY_FOOTER};

const DIVIDER: &str = "━━━━━━━━━━━━━━━";
const SIGNATURE: &str = "<i>Educational content only. Not financial advice.</i>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FooterConfig {
    pub company_name: String,
    pub telegram_channel: String,
    pub website: String,
    pub enabled: bool,
}

impl Default for FooterConfig {
    fn default() -> Self {
        Self {
            company_name: "Trading Academy".to_string(),
            telegram_channel: "@trading_academy".to_string(),
            website: "https://example.com".to_string(),
            enabled: false,
        }
    }
}

impl FooterConfig {
    /// Full footer block, including its leading blank line.
    pub fn render(&self, market: Market) -> String {
        format!(
            "\n\n{DIVIDER}\n<b>{company}</b>\n📢 {channel}\n🌐 {site}\n\n#{tag} #Trading #Education\n{SIGNATURE}",
            company = esc(&self.company_name),
            channel = esc(&self.telegram_channel),
            site = esc(&self.website),
            tag = market.hashtag(),
        )
    }

    /// One-line footer used after truncation.
    pub fn render_short(&self) -> String {
        format!(
            "\n\n<b>{}</b> | {}",
            esc(&self.company_name),
            esc(&self.telegram_channel)
        )
    }
}

fn esc(s: &str) -> String {
    html_escape::encode_text(s.trim()).into_owned()
}

/// Stored footer, or defaults when absent. Read failures also fall back to
/// defaults so a broken store never blocks posting.
pub async fn load(store: &dyn KvStore) -> FooterConfig {
    match get_json::<FooterConfig>(store, KEY_FOOTER).await {
        Ok(Some(cfg)) => cfg,
        Ok(None) => FooterConfig::default(),
        Err(e) => {
            warn!(target: "store", error = %e, "footer read failed; using defaults");
            FooterConfig::default()
        }
    }
}

/// Overwrites the stored footer wholesale.
pub async fn save(store: &dyn KvStore, cfg: &FooterConfig) -> Result<(), StoreError> {
    put_json(store, KEY_FOOTER, cfg).await
}
