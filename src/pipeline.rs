// src/pipeline.rs
//! End-to-end publish: subject → LLM → sanitize → footer → Telegram → stats.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::BotConfig;
use crate::error::{BotError, BotResult};
use crate::footer::{self, FooterConfig};
use crate::image::ImageResolver;
use crate::llm::LlmClient;
use crate::prompt::build_prompt;
use crate::queue::{self, Market};
use crate::sanitize::{sanitize, truncate_markup};
use crate::stats;
use crate::store::DynStore;
use crate::telegram::{PublishOutcome, TelegramPublisher};

/// Hard cap for the reply text.
pub const MAX_CAPTION_CHARS: usize = 4000;
/// Body length kept when the cap is exceeded.
pub const TRUNCATED_BODY_CHARS: usize = 3900;
pub const ELLIPSIS: &str = "...";

/// Append the footer and enforce the length cap.
///
/// Over the cap, the body is cut to at most 3900 characters (less if the short
/// footer needs room), then `...` and the short footer follow. The result never
/// exceeds [`MAX_CAPTION_CHARS`].
pub fn compose_caption(body: &str, footer: &FooterConfig, market: Market) -> String {
    let full = if footer.enabled {
        format!("{body}{}", footer.render(market))
    } else {
        body.to_string()
    };
    if full.chars().count() <= MAX_CAPTION_CHARS {
        return full;
    }

    // A short footer that leaves no room for a body is dropped.
    let short = Some(footer)
        .filter(|f| f.enabled)
        .map(FooterConfig::render_short)
        .filter(|s| ELLIPSIS.len() + s.chars().count() < MAX_CAPTION_CHARS)
        .unwrap_or_default();
    let room = MAX_CAPTION_CHARS.saturating_sub(ELLIPSIS.len() + short.chars().count());
    let kept = truncate_markup(body, TRUNCATED_BODY_CHARS.min(room));
    format!("{kept}{ELLIPSIS}{short}")
}

#[derive(Debug, Clone, Serialize)]
pub struct PostReport {
    pub subject: Option<String>,
    pub market: Market,
    pub queue_item_id: Option<String>,
    pub caption_chars: usize,
    pub description: String,
    pub outcome: PublishOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPost {
    pub subject: Option<String>,
    pub market: Market,
    /// Sanitized model output.
    pub content: String,
    /// What would be posted: content + footer, length-capped.
    pub caption: String,
    pub caption_chars: usize,
}

/// Where the text of a post came from.
struct Source {
    subject: Option<String>,
    market: Market,
    queue_item_id: Option<String>,
}

pub struct Pipeline {
    store: DynStore,
    llm: LlmClient,
    publisher: TelegramPublisher,
    scheduled_model: String,
}

pub type SharedPipeline = Arc<Pipeline>;

impl Pipeline {
    pub fn new(
        store: DynStore,
        llm: LlmClient,
        publisher: TelegramPublisher,
        scheduled_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            llm,
            publisher,
            scheduled_model: scheduled_model.into(),
        }
    }

    /// Wire every component from config with one shared HTTP client.
    pub fn from_config(cfg: &BotConfig, store: DynStore, http: reqwest::Client) -> Self {
        let images = ImageResolver::new(http.clone(), &cfg.image_search_base)
            .with_backups(cfg.backup_images.clone().unwrap_or_default());
        let publisher = TelegramPublisher::new(http.clone(), cfg, images);
        let llm = LlmClient::new(http, cfg);
        Self::new(store, llm, publisher, &cfg.llm_scheduled_model)
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub fn publisher(&self) -> &TelegramPublisher {
        &self.publisher
    }

    /// Scheduled publish. An LLM failure aborts before anything is recorded.
    pub async fn build_and_send(&self) -> BotResult<PostReport> {
        self.publisher.credentials()?;

        let source = match queue::next_unprocessed(self.store.as_ref()).await? {
            Some(item) => {
                info!(target: "pipeline", id = %item.id, market = %item.market, "using queued subject");
                Source {
                    subject: Some(item.subject),
                    market: item.market,
                    queue_item_id: Some(item.id),
                }
            }
            None => {
                let market = Market::random();
                info!(target: "pipeline", %market, "queue empty; using generic topic");
                Source {
                    subject: None,
                    market,
                    queue_item_id: None,
                }
            }
        };

        let prompt = build_prompt(source.subject.as_deref(), source.market);
        let raw = self
            .llm
            .generate(&prompt, Some(&self.scheduled_model))
            .await?;
        self.publish_content(&raw, source).await
    }

    /// Admin-supplied text, published through the same sanitize/footer/stats path.
    pub async fn publish_manual(&self, text: &str, market: Market) -> BotResult<PostReport> {
        self.publisher.credentials()?;
        self.publish_content(
            text,
            Source {
                subject: None,
                market,
                queue_item_id: None,
            },
        )
        .await
    }

    /// Preview generation for the admin panel. Touches neither the queue nor stats.
    pub async fn generate_content(
        &self,
        subject: Option<&str>,
        market: Option<Market>,
        model: Option<&str>,
    ) -> BotResult<GeneratedPost> {
        let market = market.unwrap_or_else(Market::random);
        let prompt = build_prompt(subject, market);
        let raw = self.llm.generate(&prompt, model).await?;
        let content = sanitize(&raw);
        let footer = footer::load(self.store.as_ref()).await;
        let caption = compose_caption(&content, &footer, market);
        Ok(GeneratedPost {
            subject: subject.map(str::to_string),
            market,
            caption_chars: caption.chars().count(),
            content,
            caption,
        })
    }

    async fn publish_content(&self, raw: &str, source: Source) -> BotResult<PostReport> {
        let body = sanitize(raw);
        if body.is_empty() {
            return Err(BotError::UnexpectedFormat(
                "generated text is empty after sanitizing".to_string(),
            ));
        }
        let footer = footer::load(self.store.as_ref()).await;
        let caption = compose_caption(&body, &footer, source.market);
        let image_url = self
            .publisher
            .images()
            .build_url(&[source.market.as_str(), "trading", "finance"]);

        counter!("posts_attempted_total").increment(1);
        let outcome = match self.publisher.publish(&caption, &image_url).await {
            Ok(o) => o,
            Err(e) => {
                counter!("posts_failed_total", "kind" => e.kind()).increment(1);
                error!(target: "pipeline", error = %e, "publish failed");
                if let Err(se) = stats::record_attempt(self.store.as_ref(), false).await {
                    warn!(target: "pipeline", error = %se, "could not record failed attempt");
                }
                return Err(e);
            }
        };

        if let Err(e) = stats::record_attempt(self.store.as_ref(), true).await {
            warn!(target: "pipeline", error = %e, "post is out but stats were not updated");
        }
        if let Some(id) = &source.queue_item_id {
            match queue::remove(self.store.as_ref(), id).await {
                Ok(true) => info!(target: "pipeline", %id, "queue item consumed"),
                Ok(false) => warn!(target: "pipeline", %id, "queue item vanished before removal"),
                Err(e) => warn!(target: "pipeline", %id, error = %e, "post is out but queue item was not removed"),
            }
        }
        counter!("posts_published_total", "mode" => outcome.mode()).increment(1);

        let description = outcome.describe();
        info!(target: "pipeline", market = %source.market, mode = outcome.mode(), %description, "post published");
        Ok(PostReport {
            subject: source.subject,
            market: source.market,
            queue_item_id: source.queue_item_id,
            caption_chars: caption.chars().count(),
            description,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footer_on() -> FooterConfig {
        FooterConfig {
            company_name: "Acme".into(),
            telegram_channel: "@acme".into(),
            website: "https://acme.test".into(),
            enabled: true,
        }
    }

    #[test]
    fn short_caption_gets_full_footer() {
        let c = compose_caption("<b>Lesson</b>", &footer_on(), Market::Crypto);
        assert!(c.starts_with("<b>Lesson</b>\n\n━"));
        assert!(c.contains("#Crypto"));
    }

    #[test]
    fn disabled_footer_leaves_body_alone() {
        let c = compose_caption("body", &FooterConfig::default(), Market::Forex);
        assert_eq!(c, "body");
    }

    #[test]
    fn long_caption_is_truncated_with_short_footer() {
        let body = "x".repeat(4300);
        let f = footer_on();
        let c = compose_caption(&body, &f, Market::Forex);
        assert!(c.chars().count() <= MAX_CAPTION_CHARS);
        assert!(c.ends_with(&format!("{ELLIPSIS}{}", f.render_short())));
        assert_eq!(c.chars().filter(|ch| *ch == 'x').count(), TRUNCATED_BODY_CHARS);
    }

    #[test]
    fn long_footer_shrinks_the_body_further() {
        let mut f = footer_on();
        f.company_name = "C".repeat(300);
        let c = compose_caption(&"y".repeat(5000), &f, Market::Crypto);
        assert!(c.chars().count() <= MAX_CAPTION_CHARS);
        assert!(c.contains(ELLIPSIS));
    }

    #[test]
    fn oversized_footer_is_dropped_to_respect_the_cap() {
        let mut f = footer_on();
        f.company_name = "C".repeat(4100);
        let c = compose_caption(&"y".repeat(5000), &f, Market::Crypto);
        assert!(c.chars().count() <= MAX_CAPTION_CHARS, "got {}", c.chars().count());
        assert!(c.ends_with(ELLIPSIS));
        assert!(!c.contains("CCCC"));
        assert_eq!(c.chars().filter(|ch| *ch == 'y').count(), TRUNCATED_BODY_CHARS);
    }

    #[test]
    fn truncation_keeps_markup_balanced() {
        let body = format!("{}<b>{}</b>", "a".repeat(3890), "b".repeat(200));
        let c = compose_caption(&body, &FooterConfig::default(), Market::Crypto);
        assert!(!c.contains("<b>"), "cut inside <b> must drop the tag");
        assert!(c.ends_with(ELLIPSIS));
    }
}
