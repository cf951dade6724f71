// src/error.rs
//! Error taxonomy shared by the pipeline components.

use std::time::Duration;

/// Failures surfaced by the LLM client, the publisher and the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Missing or malformed credentials. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-2xx answer from a remote API (after the retry policy gave up).
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// LLM call exceeded its wall-clock budget.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Remote answered 2xx but with a shape we do not recognize.
    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),

    /// Both the image path and the text-only fallback failed.
    #[error("complete posting failure: image post failed ({image}); text-only post failed ({text})")]
    CompletePostingFailure { image: String, text: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BotError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short machine-friendly kind, used for metrics labels and API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Upstream { .. } => "upstream",
            Self::Timeout(_) => "timeout",
            Self::UnexpectedFormat(_) => "unexpected_format",
            Self::CompletePostingFailure { .. } => "complete_posting_failure",
            Self::Transport(_) => "transport",
            Self::Store(_) => "store",
        }
    }
}

/// Key-value store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io error on key `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid store key `{0}`")]
    InvalidKey(String),

    #[error("cannot encode value for key `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_failure_message_carries_both_causes() {
        let e = BotError::CompletePostingFailure {
            image: "HTTP 400".into(),
            text: "HTTP 403".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 400"));
        assert!(msg.contains("HTTP 403"));
        assert_eq!(e.kind(), "complete_posting_failure");
    }
}
