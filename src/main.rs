//! Trading-education channel bot: binary entrypoint.
//! Boots the Axum admin server and the posting scheduler.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trading_edu_bot::{api, http_client, metrics::Metrics, open_store, scheduler, BotConfig};

/// Compact logs by default, JSON lines with `LOG_FORMAT=json`.
/// `try_init` leaves any subscriber the host already installed in place.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trading_edu_bot=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = BotConfig::from_env()?;
    tracing::info!(
        telegram_token_len = cfg.telegram_token.as_deref().map_or(0, str::len),
        chat_id_set = cfg.telegram_chat_id.is_some(),
        llm_key_len = cfg.llm_api_key.as_deref().map_or(0, str::len),
        model = %cfg.llm_model,
        scheduled_model = %cfg.llm_scheduled_model,
        "config loaded"
    );
    if cfg.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set; all /api endpoints will answer 401");
    }

    let store = open_store(&cfg)?;
    let state = api::AppState::from_config(&cfg, store, http_client()?);

    if cfg.scheduler_enabled {
        scheduler::spawn_posting_scheduler(state.pipeline.clone(), cfg.post_interval);
    } else {
        tracing::info!("scheduler disabled (SCHEDULER_ENABLED=false)");
    }

    let mut router = api::router(state);
    match Metrics::init() {
        Ok(metrics) => router = router.merge(metrics.router()),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    Ok(router.into())
}
