// src/retry.rs
//! Bounded retry for outbound HTTP calls.
//!
//! - 429: sleep the server's `Retry-After` seconds (or the default) and retry;
//!   the backoff exponent does not advance.
//! - other non-2xx or transport errors: exponential backoff (base, 2×base, 4×base, ...).
//! - the last attempt's error is returned as-is.

use std::time::Duration;

use reqwest::{header::RETRY_AFTER, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::{BotError, BotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            default_retry_after: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `step` (0-based) for non-429 failures.
    pub fn backoff(&self, step: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << step.min(16))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn upstream_error(resp: Response) -> BotError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    BotError::Upstream { status, body }
}

/// Send the request built by `make` until it returns 2xx or attempts run out.
/// `make` is called once per attempt since a `RequestBuilder` is consumed by `send`.
pub async fn send_with_retry<F>(policy: &RetryPolicy, what: &str, mut make: F) -> BotResult<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let attempts = policy.attempts();
    let mut backoff_step: u32 = 0;

    for attempt in 1..=attempts {
        let last = attempt == attempts;
        match make().send().await {
            Ok(resp) if resp.status().is_success() => {
                if attempt > 1 {
                    debug!(target: "http", what, attempt, "succeeded after retry");
                }
                return Ok(resp);
            }
            Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                let wait = retry_after(&resp).unwrap_or(policy.default_retry_after);
                if last {
                    return Err(upstream_error(resp).await);
                }
                warn!(target: "http", what, attempt, wait_ms = wait.as_millis() as u64, "rate limited; honoring Retry-After");
                tokio::time::sleep(wait).await;
            }
            Ok(resp) => {
                if last {
                    return Err(upstream_error(resp).await);
                }
                let wait = policy.backoff(backoff_step);
                backoff_step += 1;
                warn!(target: "http", what, attempt, status = resp.status().as_u16(), wait_ms = wait.as_millis() as u64, "non-2xx; backing off");
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                if last {
                    return Err(BotError::Transport(e));
                }
                let wait = policy.backoff(backoff_step);
                backoff_step += 1;
                warn!(target: "http", what, attempt, error = %e, wait_ms = wait.as_millis() as u64, "request failed; backing off");
                tokio::time::sleep(wait).await;
            }
        }
    }

    unreachable!("retry loop always returns on the last attempt")
}
