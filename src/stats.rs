// src/stats.rs
//! Posting counters stored under `posting_stats`.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::store::{get_json, put_json, KvStore, KEY_STATS};

const WEEK: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostingStats {
    pub total_posts: u64,
    pub successful_posts: u64,
    pub failed_posts: u64,
    pub last_post_date: Option<DateTime<Utc>>,
    pub posts_this_month: u64,
    pub posts_this_week: u64,
}

impl PostingStats {
    /// Apply one publish attempt at `now`.
    ///
    /// Month counter resets when `now` falls in a different calendar month than
    /// the previous attempt; week counter resets once 7 days have passed since it.
    /// Both count every attempt, like `total_posts`.
    pub fn apply(&mut self, success: bool, now: DateTime<Utc>) {
        self.total_posts += 1;
        if success {
            self.successful_posts += 1;
        } else {
            self.failed_posts += 1;
        }

        if let Some(last) = self.last_post_date {
            if (last.year(), last.month()) != (now.year(), now.month()) {
                self.posts_this_month = 0;
            }
            if now.signed_duration_since(last) >= ChronoDuration::days(WEEK) {
                self.posts_this_week = 0;
            }
        }
        self.posts_this_month += 1;
        self.posts_this_week += 1;
        self.last_post_date = Some(now);
    }
}

pub async fn load(store: &dyn KvStore) -> PostingStats {
    match get_json::<PostingStats>(store, KEY_STATS).await {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => {
            warn!(target: "store", error = %e, "stats read failed; starting from zero");
            PostingStats::default()
        }
    }
}

/// Read-modify-write of the stored counters.
pub async fn record_attempt(
    store: &dyn KvStore,
    success: bool,
) -> Result<PostingStats, StoreError> {
    record_attempt_at(store, success, Utc::now()).await
}

pub async fn record_attempt_at(
    store: &dyn KvStore,
    success: bool,
    now: DateTime<Utc>,
) -> Result<PostingStats, StoreError> {
    let mut stats = load(store).await;
    stats.apply(success, now);
    put_json(store, KEY_STATS, &stats).await?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn alternating_attempts_add_up() {
        let store = MemoryStore::new();
        let n = 7;
        for i in 0..n {
            record_attempt(&store, i % 2 == 0).await.unwrap();
        }
        let s = load(&store).await;
        assert_eq!(s.total_posts, n);
        assert_eq!(s.successful_posts + s.failed_posts, n);
        assert_eq!(s.successful_posts, 4);
        assert!(s.last_post_date.is_some());
    }

    #[test]
    fn month_boundary_resets_month_counter_to_one() {
        let mut s = PostingStats::default();
        s.apply(true, at(2025, 1, 28));
        s.apply(true, at(2025, 1, 30));
        assert_eq!(s.posts_this_month, 2);

        s.apply(true, at(2025, 2, 1));
        assert_eq!(s.posts_this_month, 1);
        // only 2 days since the last post: week keeps counting
        assert_eq!(s.posts_this_week, 3);
        assert_eq!(s.total_posts, 3);
    }

    #[test]
    fn same_month_different_year_still_resets() {
        let mut s = PostingStats::default();
        s.apply(true, at(2024, 3, 10));
        s.apply(true, at(2025, 3, 10));
        assert_eq!(s.posts_this_month, 1);
    }

    #[test]
    fn seven_day_gap_resets_week_counter() {
        let mut s = PostingStats::default();
        s.apply(true, at(2025, 5, 1));
        s.apply(false, at(2025, 5, 6));
        assert_eq!(s.posts_this_week, 2);

        s.apply(true, at(2025, 5, 13));
        assert_eq!(s.posts_this_week, 1);
        assert_eq!(s.posts_this_month, 3);
        assert_eq!(s.failed_posts, 1);
    }

    #[test]
    fn camel_case_wire_format() {
        let v = serde_json::to_value(PostingStats::default()).unwrap();
        for k in [
            "totalPosts",
            "successfulPosts",
            "failedPosts",
            "lastPostDate",
            "postsThisMonth",
            "postsThisWeek",
        ] {
            assert!(v.get(k).is_some(), "missing {k}");
        }
    }
}
