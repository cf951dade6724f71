// src/scheduler.rs
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pipeline::SharedPipeline;

/// One scheduled tick: run the pipeline and log the outcome. Never panics,
/// never propagates.
pub async fn run_scheduled_once(pipeline: SharedPipeline) {
    counter!("scheduler_ticks_total").increment(1);
    gauge!("scheduler_last_tick_ts").set(chrono::Utc::now().timestamp() as f64);

    match pipeline.build_and_send().await {
        Ok(report) => tracing::info!(
            target: "scheduler",
            market = %report.market,
            queued = report.queue_item_id.is_some(),
            outcome = %report.description,
            "scheduled post done"
        ),
        Err(e) => tracing::error!(
            target: "scheduler",
            kind = e.kind(),
            error = %e,
            "scheduled post failed"
        ),
    }
}

/// Fire the pipeline every `period`. Each run is spawned on its own task so a
/// slow run never delays the next tick. The first tick fires one period after
/// startup, not immediately.
pub fn spawn_posting_scheduler(pipeline: SharedPipeline, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(target: "scheduler", period_secs = period.as_secs(), "posting scheduler started");
        loop {
            ticker.tick().await;
            tokio::spawn(run_scheduled_once(pipeline.clone()));
        }
    })
}
