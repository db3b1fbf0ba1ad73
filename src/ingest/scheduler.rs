// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::aggregator::{AggregationOutcome, Aggregator};
use crate::ingest::config::{FetchIntervals, MAX_INTERVAL_HOURS};
use crate::ingest::types::SourceKind;

const FULL_RUN_EVERY_HOURS: u64 = 24;

fn hours(h: u64) -> Duration {
    Duration::from_secs(h.clamp(1, MAX_INTERVAL_HOURS).saturating_mul(3600))
}

/// Background tickers: one per source at its own interval, plus a daily full
/// run. The first tick of each comes one full period after start.
pub fn spawn_scheduler(agg: Arc<Aggregator>, intervals: FetchIntervals) -> Vec<JoinHandle<()>> {
    let intervals = intervals.clamped();
    let mut handles: Vec<JoinHandle<()>> = [
        (SourceKind::Tools, intervals.tools_hours),
        (SourceKind::News, intervals.news_hours),
        (SourceKind::Trending, intervals.trending_hours),
    ]
    .into_iter()
    .map(|(kind, h)| spawn_source_ticker(agg.clone(), kind, hours(h)))
    .collect();

    let period = hours(FULL_RUN_EVERY_HOURS);
    handles.push(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match agg.run_full_aggregation().await {
                AggregationOutcome::Busy => {
                    tracing::info!(target: "ingest", "scheduled full run skipped: busy")
                }
                AggregationOutcome::Finished(s) => tracing::info!(
                    target: "ingest",
                    errors = s.errors.len(),
                    duration_ms = s.duration_ms,
                    "scheduled full run done"
                ),
            }
        }
    }));

    tracing::info!(
        target: "ingest",
        tools_h = intervals.tools_hours,
        news_h = intervals.news_hours,
        trending_h = intervals.trending_hours,
        "scheduler started"
    );
    handles
}

fn spawn_source_ticker(agg: Arc<Aggregator>, kind: SourceKind, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let res = match kind {
                SourceKind::Tools => agg.run_tools_ingestion().await,
                SourceKind::News => agg.run_news_ingestion().await,
                SourceKind::Trending => agg.run_trending_ingestion().await,
            };
            tracing::info!(
                target: "ingest",
                source = kind.label(),
                success = res.success,
                saved = res.total_saved,
                "scheduled tick"
            );
        }
    })
}
