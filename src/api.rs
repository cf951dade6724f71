// src/api.rs
//! Admin HTTP surface. Everything under `/api` requires
//! `Authorization: Bearer <ADMIN_TOKEN>`; without a configured token every
//! admin call is rejected.

use std::sync::Arc;

use shuttle_axum::axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{info, warn};

use crate::config::BotConfig;
use crate::error::{BotError, StoreError};
use crate::footer::{self, FooterConfig};
use crate::pipeline::{Pipeline, SharedPipeline};
use crate::queue::{self, Market};
use crate::stats;
use crate::store::DynStore;
use crate::telegram::is_valid_bot_token;

pub const UI_DIR: &str = "ui";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: SharedPipeline,
    admin_token: Option<Arc<str>>,
    debug_info: Arc<DebugConfig>,
}

/// Config facts exposed by `/api/debug`. Never the secrets themselves.
#[derive(Debug, Clone, serde::Serialize)]
struct DebugConfig {
    telegram_token_present: bool,
    telegram_token_valid: bool,
    telegram_chat_id_present: bool,
    telegram_api_base: String,
    llm_api_key_present: bool,
    llm_api_url: String,
    llm_model: String,
    llm_scheduled_model: String,
    llm_timeout_secs: u64,
    scheduler_enabled: bool,
    post_interval_secs: u64,
    store_dir: Option<String>,
}

impl DebugConfig {
    fn from_config(cfg: &BotConfig) -> Self {
        Self {
            telegram_token_present: cfg.telegram_token.is_some(),
            telegram_token_valid: cfg
                .telegram_token
                .as_deref()
                .is_some_and(is_valid_bot_token),
            telegram_chat_id_present: cfg.telegram_chat_id.is_some(),
            telegram_api_base: cfg.telegram_api_base.clone(),
            llm_api_key_present: cfg.llm_api_key.is_some(),
            llm_api_url: cfg.llm_api_url.clone(),
            llm_model: cfg.llm_model.clone(),
            llm_scheduled_model: cfg.llm_scheduled_model.clone(),
            llm_timeout_secs: cfg.llm_timeout.as_secs(),
            scheduler_enabled: cfg.scheduler_enabled,
            post_interval_secs: cfg.post_interval.as_secs(),
            store_dir: cfg.store_dir.as_ref().map(|p| p.display().to_string()),
        }
    }
}

impl AppState {
    pub fn new(pipeline: SharedPipeline, cfg: &BotConfig) -> Self {
        Self {
            pipeline,
            admin_token: cfg.admin_token.as_deref().map(Arc::from),
            debug_info: Arc::new(DebugConfig::from_config(cfg)),
        }
    }

    /// Build the pipeline from config and wrap it.
    pub fn from_config(cfg: &BotConfig, store: DynStore, http: reqwest::Client) -> Self {
        let pipeline = Arc::new(Pipeline::from_config(cfg, store, http));
        Self::new(pipeline, cfg)
    }

    fn store(&self) -> &DynStore {
        self.pipeline.store()
    }
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/queue", get(list_queue).post(add_to_queue))
        .route("/api/queue/{id}", delete(delete_from_queue))
        .route("/api/footer", get(get_footer).post(save_footer))
        .route("/api/stats", get(get_stats))
        .route("/api/generate", post(generate))
        .route("/api/post", post(post_now))
        .route("/api/debug", get(debug_info))
        .route("/api/test-post", post(test_post))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(admin)
        .fallback_service(ServeDir::new(UI_DIR))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    kind: Option<&'static str>,
    details: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind: None,
            details: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    /// Message plus the full error chain; only for debug-style endpoints.
    fn detailed(err: BotError) -> Self {
        let mut chain = format!("{err:?}");
        let mut source = std::error::Error::source(&err);
        while let Some(s) = source {
            chain.push_str("\ncaused by: ");
            chain.push_str(&s.to_string());
            source = s.source();
        }
        let mut out = Self::from(err);
        out.details = Some(chain);
        out
    }
}

impl From<BotError> for ApiError {
    fn from(e: BotError) -> Self {
        let mut out = Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        out.kind = Some(e.kind());
        out
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        BotError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(target: "api", status = self.status.as_u16(), error = %self.message, "request failed");
        }
        let mut body = json!({ "success": false, "error": self.message });
        if let Some(kind) = self.kind {
            body["kind"] = json!(kind);
        }
        if let Some(details) = self.details {
            body["details"] = json!(details);
        }
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Compare digests so the comparison time does not depend on the common prefix.
fn tokens_match(expected: &str, provided: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(provided.as_bytes())
}

async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let authorized = match (state.admin_token.as_deref(), provided) {
        (Some(expected), Some(got)) => tokens_match(expected, got),
        _ => false,
    };
    if !authorized {
        return ApiError::unauthorized().into_response();
    }
    next.run(req).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Empty body → `T::default()`; otherwise JSON.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

fn parse_market(raw: Option<&str>) -> ApiResult<Option<Market>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Market>())
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

async fn list_queue(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let items = queue::list(state.store().as_ref()).await?;
    Ok(Json(json!({ "count": items.len(), "items": items })))
}

#[derive(Debug, Deserialize)]
struct AddQueueReq {
    subject: String,
    #[serde(default)]
    market: Option<String>,
}

async fn add_to_queue(
    State(state): State<AppState>,
    Json(req): Json<AddQueueReq>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if req.subject.trim().is_empty() {
        return Err(ApiError::bad_request("subject must not be empty"));
    }
    let market = parse_market(req.market.as_deref())?.unwrap_or(Market::Crypto);
    let item = queue::add_subject(state.store().as_ref(), &req.subject, market).await?;
    info!(target: "api", id = %item.id, %market, "subject queued");
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "item": item }))))
}

async fn delete_from_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = state.store().as_ref();
    if id == "clear" {
        queue::clear(store).await?;
        info!(target: "api", "queue cleared");
        return Ok(Json(json!({ "success": true, "cleared": true })));
    }
    if !queue::remove(store, &id).await? {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "queue item not found"));
    }
    Ok(Json(json!({ "success": true, "removed": id })))
}

async fn get_footer(State(state): State<AppState>) -> Json<FooterConfig> {
    Json(footer::load(state.store().as_ref()).await)
}

async fn save_footer(
    State(state): State<AppState>,
    Json(cfg): Json<FooterConfig>,
) -> ApiResult<Json<serde_json::Value>> {
    footer::save(state.store().as_ref(), &cfg).await?;
    Ok(Json(json!({ "success": true, "footer": cfg })))
}

async fn get_stats(State(state): State<AppState>) -> Json<stats::PostingStats> {
    Json(stats::load(state.store().as_ref()).await)
}

#[derive(Debug, Default, Deserialize)]
struct GenerateReq {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

async fn generate(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<serde_json::Value>> {
    let req: GenerateReq = optional_json(&body)?;
    let market = parse_market(req.market.as_deref())?;
    let post = state
        .pipeline
        .generate_content(req.subject.as_deref(), market, req.model.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "post": post })))
}

#[derive(Debug, Default, Deserialize)]
struct PostReq {
    /// Publish this text instead of generating one.
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    market: Option<String>,
}

async fn post_now(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<serde_json::Value>> {
    let req: PostReq = optional_json(&body)?;
    let market = parse_market(req.market.as_deref())?;
    let report = match req.content.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(text) => {
            state
                .pipeline
                .publish_manual(text, market.unwrap_or_else(Market::random))
                .await?
        }
        None => state.pipeline.build_and_send().await?,
    };
    Ok(Json(json!({ "success": true, "report": report })))
}

async fn debug_info(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let store = state.store().as_ref();
    let queue = queue::list(store)
        .await
        .map_err(|e| ApiError::detailed(e.into()))?;
    let credentials = match state.pipeline.publisher().credentials() {
        Ok(_) => json!({ "ok": true }),
        Err(e) => json!({ "ok": false, "error": e.to_string() }),
    };
    Ok(Json(json!({
        "config": &*state.debug_info,
        "telegram_credentials": credentials,
        "queue_length": queue.len(),
        "next_subject": queue.iter().find(|it| !it.processed),
        "footer": footer::load(store).await,
        "stats": stats::load(store).await,
        "server_time": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn test_post(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let text = format!(
        "✅ Test message from the posting bot ({})",
        chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
    );
    match state.pipeline.publisher().send_test_message(&text).await {
        Ok(message_id) => Ok(Json(json!({ "success": true, "message_id": message_id }))),
        Err(e) => Err(ApiError::detailed(e)),
    }
}
