// src/image.rs
//! Illustration picking for posts: search URL construction, a header-only
//! probe, and a fixed rotation of known-good backups.

use std::time::Duration;

use metrics::counter;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rand::seq::IndexedRandom;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::{debug, info, warn};

pub const DEFAULT_IMAGE_SEARCH_BASE: &str = "https://source.unsplash.com/1600x900/?";

/// Telegram refuses photos above this size when fetching by URL.
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

pub const BACKUP_IMAGES: [&str; 5] = [
    "https://images.unsplash.com/photo-1611974789855-9c2a0a7236a3?w=1600&q=80",
    "https://images.unsplash.com/photo-1642790106117-e829e14a795f?w=1600&q=80",
    "https://images.unsplash.com/photo-1590283603385-17ffb3a7f29f?w=1600&q=80",
    "https://images.unsplash.com/photo-1621761191319-c6fb62004040?w=1600&q=80",
    "https://images.unsplash.com/photo-1535320903710-d993d3d77d29?w=1600&q=80",
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// `base` followed by the comma-joined keywords, percent-encoded as a whole.
pub fn build_image_url(base: &str, keywords: &[&str]) -> String {
    let joined = keywords.join(",");
    format!("{base}{}", utf8_percent_encode(&joined, NON_ALPHANUMERIC))
}

/// Header check shared by the probe and tests.
pub fn is_acceptable_image(content_type: Option<&str>, content_length: Option<u64>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    if !ct.trim().to_ascii_lowercase().starts_with("image/") {
        return false;
    }
    content_length.map_or(true, |len| len <= MAX_IMAGE_BYTES)
}

#[derive(Debug, Clone)]
pub struct ImageResolver {
    http: reqwest::Client,
    search_base: String,
    backups: Vec<String>,
}

impl ImageResolver {
    pub fn new(http: reqwest::Client, search_base: impl Into<String>) -> Self {
        Self {
            http,
            search_base: search_base.into(),
            backups: BACKUP_IMAGES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the backup rotation. An empty list keeps the built-in one.
    pub fn with_backups(mut self, backups: Vec<String>) -> Self {
        if !backups.is_empty() {
            self.backups = backups;
        }
        self
    }

    pub fn build_url(&self, keywords: &[&str]) -> String {
        build_image_url(&self.search_base, keywords)
    }

    pub fn pick_backup_image(&self) -> String {
        self.backups
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| BACKUP_IMAGES[0].to_string())
    }

    /// HEAD probe. Any failure, including transport errors, means "not usable".
    pub async fn validate_image(&self, url: &str) -> bool {
        let resp = match self.http.head(url).timeout(PROBE_TIMEOUT).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(target: "image", url, error = %e, "image probe failed");
                return false;
            }
        };
        if !resp.status().is_success() {
            debug!(target: "image", url, status = resp.status().as_u16(), "image probe non-2xx");
            return false;
        }
        let headers = resp.headers();
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let ok = is_acceptable_image(content_type, content_length);
        if !ok {
            debug!(target: "image", url, ?content_type, ?content_length, "image rejected");
        }
        ok
    }

    /// Primary if it validates, else one validated backup, else a second
    /// backup accepted without probing. At most two probes per post.
    pub async fn resolve(&self, primary: &str) -> String {
        if self.validate_image(primary).await {
            return primary.to_string();
        }
        counter!("image_fallbacks_total").increment(1);

        let backup = self.pick_backup_image();
        if self.validate_image(&backup).await {
            info!(target: "image", %backup, "primary image unusable; using backup");
            return backup;
        }

        let unchecked = self.pick_backup_image();
        warn!(target: "image", %unchecked, "backup image also unusable; using another backup unvalidated");
        unchecked
    }
}
