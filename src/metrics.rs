use shuttle_axum::axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;

        describe_counter!("posts_attempted_total", "Publish attempts that reached Telegram.");
        describe_counter!("posts_published_total", "Successful publishes, by delivery mode.");
        describe_counter!("posts_failed_total", "Publishes that failed outright, by error kind.");
        describe_counter!("telegram_posts_total", "Publisher terminal states, by mode.");
        describe_counter!("image_fallbacks_total", "Primary image rejected; backup rotation used.");
        describe_counter!("llm_requests_total", "LLM calls, by outcome.");
        describe_histogram!("llm_latency_ms", "LLM call wall-clock time in milliseconds.");
        describe_counter!("scheduler_ticks_total", "Scheduled pipeline runs.");
        describe_gauge!("scheduler_last_tick_ts", "Unix ts of the last scheduled run.");

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
