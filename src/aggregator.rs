//! aggregator.rs: runs the three source pipelines and merges their output.
//!
//! A full run is single-flight: a second trigger while one is in progress gets
//! `Busy` back immediately. Pipelines are isolated from each other; a failing
//! one is reported in the summary and demotes the run, nothing more.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use metrics::{counter, gauge};
use serde::Serialize;

use crate::ingest::config::{FetchIntervals, IngestConfig};
use crate::ingest::ensure_metrics_described;
use crate::ingest::fetch::{HttpFetcher, PageFetcher};
use crate::ingest::providers::catalog::CatalogSeeder;
use crate::ingest::providers::feeds::FeedFetcher;
use crate::ingest::providers::trending::TrendingScraper;
use crate::ingest::types::{
    FetchLogEntry, FetchStatus, NewsItemDraft, NewsSource, SourceBatch, SourceKind, SourceResult,
    ToolCandidate, ToolSource,
};
use crate::store::Store;

pub const FULL_AGGREGATION_LABEL: &str = "Full Aggregation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
}

/// Held for the duration of a full run; puts the state back to `Idle` on drop,
/// unwinding included.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());
        *s = RunState::Idle;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceError {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
}

impl RunStatus {
    fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
        }
    }
}

/// Per-pipeline results of one full run. A pipeline that failed has no
/// result and an entry in `errors` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub tools: Option<SourceResult>,
    pub news: Option<SourceResult>,
    pub trending: Option<SourceResult>,
    pub errors: Vec<SourceError>,
    pub status: RunStatus,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    Busy,
    Finished(RunSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatusReport {
    pub is_running: bool,
    pub last_fetch: BTreeMap<SourceKind, DateTime<Utc>>,
    /// Advisory only: last successful fetch plus the configured interval.
    pub next_scheduled: BTreeMap<SourceKind, DateTime<Utc>>,
}

#[derive(Debug, Default, Clone)]
struct MergeTally {
    fetched: usize,
    saved: usize,
    failed: usize,
    /// Partial source failures reported alongside the items.
    warnings: Vec<String>,
}

impl MergeTally {
    /// Everything short of a source failure, joined for the log row.
    fn problems(&self) -> Option<String> {
        let mut parts = self.warnings.clone();
        if self.failed > 0 {
            parts.push(format!("{} item(s) could not be stored", self.failed));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub struct Aggregator {
    store: Arc<dyn Store>,
    intervals: FetchIntervals,
    news: Box<dyn NewsSource>,
    tools: Box<dyn ToolSource>,
    trending: Box<dyn ToolSource>,
    state: Mutex<RunState>,
    last_fetch: Mutex<HashMap<SourceKind, DateTime<Utc>>>,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn Store>,
        intervals: FetchIntervals,
        news: Box<dyn NewsSource>,
        tools: Box<dyn ToolSource>,
        trending: Box<dyn ToolSource>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            intervals: intervals.clamped(),
            news,
            tools,
            trending,
            state: Mutex::new(RunState::Idle),
            last_fetch: Mutex::new(HashMap::new()),
        }
    }

    /// Production wiring: one shared HTTP fetcher behind all three sources.
    pub fn from_config(cfg: &IngestConfig, store: Arc<dyn Store>) -> Result<Self> {
        let fetcher: Arc<dyn PageFetcher> =
            Arc::new(HttpFetcher::from_config(cfg).context("building http fetcher")?);

        let news = FeedFetcher::new(fetcher.clone(), cfg.rss_feeds.clone(), cfg.keyword_table());
        let tools = CatalogSeeder::new(fetcher.clone());
        let trending = TrendingScraper::new(
            fetcher,
            cfg.trending_url.clone(),
            cfg.trending_languages.clone(),
            cfg.trending_since.clone(),
        );

        Ok(Self::new(
            store,
            cfg.intervals,
            Box::new(news),
            Box::new(tools),
            Box::new(trending),
        ))
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *s == RunState::Running {
            return None;
        }
        *s = RunState::Running;
        Some(RunGuard { state: &self.state })
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) == RunState::Running
    }

    pub async fn run_full_aggregation(&self) -> AggregationOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::info!(target: "ingest", "aggregation already running; skipping");
            return AggregationOutcome::Busy;
        };

        let t0 = Instant::now();
        tracing::info!(target: "ingest", "full aggregation started");

        let (news, tools, trending) = tokio::join!(
            self.guarded_pipeline(SourceKind::News),
            self.guarded_pipeline(SourceKind::Tools),
            self.guarded_pipeline(SourceKind::Trending),
        );

        let mut errors = Vec::new();
        let mut keep = |kind: SourceKind, r: Result<SourceResult>| match r {
            Ok(res) => Some(res),
            Err(e) => {
                errors.push(SourceError {
                    source: kind.label().to_string(),
                    error: format!("{e:#}"),
                });
                None
            }
        };
        let news = keep(SourceKind::News, news);
        let tools = keep(SourceKind::Tools, tools);
        let trending = keep(SourceKind::Trending, trending);

        let (fetched, saved) = [&tools, &news, &trending]
            .into_iter()
            .flatten()
            .fold((0, 0), |(f, s), r| (f + r.total_fetched, s + r.total_saved));

        let status = if errors.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };
        let duration_ms = t0.elapsed().as_millis() as u64;

        let partial = [
            (SourceKind::Tools, &tools),
            (SourceKind::News, &news),
            (SourceKind::Trending, &trending),
        ]
        .into_iter()
        .filter_map(|(k, r)| {
            r.as_ref()
                .and_then(|r| r.error.as_deref())
                .map(|e| format!("{}: {e}", k.label()))
        });
        let joined = errors
            .iter()
            .map(|e| format!("{}: {}", e.source, e.error))
            .chain(partial)
            .collect::<Vec<_>>()
            .join("; ");
        self.write_log(FetchLogEntry {
            source: FULL_AGGREGATION_LABEL.to_string(),
            status: if joined.is_empty() {
                FetchStatus::Success
            } else {
                FetchStatus::Partial
            },
            items_fetched: fetched,
            items_saved: saved,
            duration_ms,
            error_message: (!joined.is_empty()).then_some(joined),
            created_at: Utc::now(),
        })
        .await;

        counter!("ingest_runs_total", "status" => status.as_str()).increment(1);
        gauge!("ingest_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "ingest",
            status = status.as_str(),
            fetched,
            saved,
            errors = errors.len(),
            duration_ms,
            "full aggregation finished"
        );

        AggregationOutcome::Finished(RunSummary {
            tools,
            news,
            trending,
            errors,
            status,
            duration_ms,
        })
    }

    pub async fn run_tools_ingestion(&self) -> SourceResult {
        self.guarded_pipeline(SourceKind::Tools)
            .await
            .unwrap_or_else(|e| SourceResult::failed(format!("{e:#}")))
    }

    pub async fn run_news_ingestion(&self) -> SourceResult {
        self.guarded_pipeline(SourceKind::News)
            .await
            .unwrap_or_else(|e| SourceResult::failed(format!("{e:#}")))
    }

    pub async fn run_trending_ingestion(&self) -> SourceResult {
        self.guarded_pipeline(SourceKind::Trending)
            .await
            .unwrap_or_else(|e| SourceResult::failed(format!("{e:#}")))
    }

    pub fn run_status(&self) -> RunStatusReport {
        let last: BTreeMap<SourceKind, DateTime<Utc>> = self
            .last_fetch
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect();
        let next = last
            .iter()
            .filter_map(|(k, at)| {
                let step = i64::try_from(self.interval_hours(*k))
                    .ok()
                    .and_then(TimeDelta::try_hours)?;
                Some((*k, at.checked_add_signed(step)?))
            })
            .collect();
        RunStatusReport {
            is_running: self.is_running(),
            last_fetch: last,
            next_scheduled: next,
        }
    }

    fn interval_hours(&self, kind: SourceKind) -> u64 {
        match kind {
            SourceKind::Tools => self.intervals.tools_hours,
            SourceKind::News => self.intervals.news_hours,
            SourceKind::Trending => self.intervals.trending_hours,
        }
    }

    /// `run_pipeline` with a panic in the source turned into an `Err` and an
    /// error row, so one pipeline cannot take the whole run down.
    async fn guarded_pipeline(&self, kind: SourceKind) -> Result<SourceResult> {
        let t0 = Instant::now();
        match AssertUnwindSafe(self.run_pipeline(kind)).catch_unwind().await {
            Ok(res) => res,
            Err(payload) => {
                let label = kind.label();
                let msg = panic_message(payload.as_ref());
                self.write_log(FetchLogEntry {
                    source: label.to_string(),
                    status: FetchStatus::Error,
                    items_fetched: 0,
                    items_saved: 0,
                    duration_ms: t0.elapsed().as_millis() as u64,
                    error_message: Some(format!("panicked: {msg}")),
                    created_at: Utc::now(),
                })
                .await;
                counter!("ingest_source_errors_total", "source" => label).increment(1);
                tracing::error!(target: "ingest", source = label, panic = %msg, "pipeline panicked");
                Err(anyhow!("{label} panicked: {msg}"))
            }
        }
    }

    /// Fetch, merge and log one source. `Err` means the source itself failed;
    /// failed feeds or pages and per-item storage failures make it `partial`.
    async fn run_pipeline(&self, kind: SourceKind) -> Result<SourceResult> {
        let t0 = Instant::now();
        let label = kind.label();
        tracing::info!(target: "ingest", source = label, "pipeline started");

        let merged = match kind {
            SourceKind::News => match self.news.fetch_news().await {
                Ok(batch) => Ok(self.merge_news(batch).await),
                Err(e) => Err(e.context(format!("{} failed", self.news.name()))),
            },
            SourceKind::Tools => self.fetch_and_merge_tools(&*self.tools).await,
            SourceKind::Trending => self.fetch_and_merge_tools(&*self.trending).await,
        };
        let duration_ms = t0.elapsed().as_millis() as u64;

        match merged {
            Ok(tally) => {
                let problems = tally.problems();
                let status = if problems.is_some() {
                    FetchStatus::Partial
                } else {
                    FetchStatus::Success
                };
                self.write_log(FetchLogEntry {
                    source: label.to_string(),
                    status,
                    items_fetched: tally.fetched,
                    items_saved: tally.saved,
                    duration_ms,
                    error_message: problems.clone(),
                    created_at: Utc::now(),
                })
                .await;
                self.last_fetch
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .insert(kind, Utc::now());

                counter!("ingest_items_fetched_total", "source" => label).increment(tally.fetched as u64);
                counter!("ingest_items_saved_total", "source" => label).increment(tally.saved as u64);
                tracing::info!(
                    target: "ingest",
                    source = label,
                    fetched = tally.fetched,
                    saved = tally.saved,
                    failed = tally.failed,
                    warnings = tally.warnings.len(),
                    duration_ms,
                    "pipeline finished"
                );
                Ok(SourceResult {
                    success: true,
                    total_fetched: tally.fetched,
                    total_saved: tally.saved,
                    error: problems,
                })
            }
            Err(e) => {
                self.write_log(FetchLogEntry {
                    source: label.to_string(),
                    status: FetchStatus::Error,
                    items_fetched: 0,
                    items_saved: 0,
                    duration_ms,
                    error_message: Some(format!("{e:#}")),
                    created_at: Utc::now(),
                })
                .await;
                counter!("ingest_source_errors_total", "source" => label).increment(1);
                tracing::warn!(target: "ingest", source = label, error = %format!("{e:#}"), "pipeline failed");
                Err(e)
            }
        }
    }

    async fn fetch_and_merge_tools(&self, source: &dyn ToolSource) -> Result<MergeTally> {
        let batch = source
            .fetch_tools()
            .await
            .with_context(|| format!("{} failed", source.name()))?;
        Ok(self.merge_tools(batch).await)
    }

    async fn merge_tools(&self, batch: SourceBatch<ToolCandidate>) -> MergeTally {
        let mut tally = MergeTally {
            fetched: batch.items.len(),
            warnings: batch.warnings,
            ..MergeTally::default()
        };
        for tool in &batch.items {
            if !tool.has_natural_key() {
                tracing::debug!(target: "ingest", name = %tool.name, "tool without natural key dropped");
                continue;
            }
            match self.store.upsert_tool(tool).await {
                Ok(_) => tally.saved += 1,
                Err(e) => {
                    tally.failed += 1;
                    tracing::warn!(target: "ingest", name = %tool.name, error = %format!("{e:#}"), "tool upsert failed");
                }
            }
        }
        tally
    }

    async fn merge_news(&self, batch: SourceBatch<NewsItemDraft>) -> MergeTally {
        let mut tally = MergeTally {
            fetched: batch.items.len(),
            warnings: batch.warnings,
            ..MergeTally::default()
        };
        for item in &batch.items {
            if !item.has_natural_key() {
                tracing::debug!(target: "ingest", title = %item.title, "news item without natural key dropped");
                continue;
            }
            match self.store.upsert_news(item).await {
                Ok(_) => tally.saved += 1,
                Err(e) => {
                    tally.failed += 1;
                    tracing::warn!(target: "ingest", title = %item.title, error = %format!("{e:#}"), "news upsert failed");
                }
            }
        }
        tally
    }

    async fn write_log(&self, entry: FetchLogEntry) {
        if let Err(e) = self.store.append_fetch_log(entry).await {
            tracing::warn!(target: "ingest", error = %format!("{e:#}"), "fetch log write failed");
        }
    }
}
