use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::aggregator::{AggregationOutcome, Aggregator, RunStatusReport};
use crate::ingest::types::{FetchLogEntry, SourceResult};
use crate::store::InMemoryStore;

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub store: Arc<InMemoryStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ingest/run", post(run_full))
        .route("/ingest/tools", post(run_tools))
        .route("/ingest/news", post(run_news))
        .route("/ingest/trending", post(run_trending))
        .route("/ingest/status", get(status))
        .route("/ingest/logs", get(logs))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn run_full(State(state): State<AppState>) -> Response {
    match state.aggregator.run_full_aggregation().await {
        AggregationOutcome::Finished(summary) => Json(summary).into_response(),
        AggregationOutcome::Busy => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "aggregation already running" })),
        )
            .into_response(),
    }
}

async fn run_tools(State(state): State<AppState>) -> Json<SourceResult> {
    Json(state.aggregator.run_tools_ingestion().await)
}

async fn run_news(State(state): State<AppState>) -> Json<SourceResult> {
    Json(state.aggregator.run_news_ingestion().await)
}

async fn run_trending(State(state): State<AppState>) -> Json<SourceResult> {
    Json(state.aggregator.run_trending_ingestion().await)
}

async fn status(State(state): State<AppState>) -> Json<RunStatusReport> {
    Json(state.aggregator.run_status())
}

#[derive(serde::Deserialize)]
struct LogsQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> Json<Vec<FetchLogEntry>> {
    let limit = q.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    Json(state.store.recent_logs(limit))
}
