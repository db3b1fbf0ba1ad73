// tests/api_http.rs
//
// HTTP-level tests for the trigger Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use radar_ingest::api::{self, AppState};
use radar_ingest::ingest::config::FetchIntervals;
use radar_ingest::ingest::types::{
    NewsItemDraft, NewsSource, SourceBatch, ToolCandidate, ToolCategory, ToolSource,
};
use radar_ingest::{Aggregator, InMemoryStore, Store};

const BODY_LIMIT: usize = 1024 * 1024;

struct NoNews;

#[async_trait]
impl NewsSource for NoNews {
    async fn fetch_news(&self) -> Result<SourceBatch<NewsItemDraft>> {
        Ok(Vec::new().into())
    }
    fn name(&self) -> &'static str {
        "no news"
    }
}

struct OneTool(Duration);

#[async_trait]
impl ToolSource for OneTool {
    async fn fetch_tools(&self) -> Result<SourceBatch<ToolCandidate>> {
        tokio::time::sleep(self.0).await;
        Ok(vec![ToolCandidate::new(
            "DeepL",
            "https://www.deepl.com",
            ToolCategory::Translate,
            "test",
        )]
        .into())
    }
    fn name(&self) -> &'static str {
        "one tool"
    }
}

fn state(delay: Duration) -> AppState {
    let store = Arc::new(InMemoryStore::new());
    let aggregator = Arc::new(Aggregator::new(
        store.clone() as Arc<dyn Store>,
        FetchIntervals::default(),
        Box::new(NoNews),
        Box::new(OneTool(delay)),
        Box::new(OneTool(Duration::ZERO)),
    ));
    AppState { aggregator, store }
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

#[tokio::test]
async fn health_returns_ok() {
    let app = api::router(state(Duration::ZERO));
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn full_run_returns_summary_and_writes_logs() {
    let app = api::router(state(Duration::ZERO));

    let (status, v) = send(&app, "POST", "/ingest/run").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "completed");
    assert_eq!(v["tools"]["total_saved"], 1);
    assert!(v["errors"].as_array().unwrap().is_empty());

    let (status, logs) = send(&app, "GET", "/ingest/logs?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let rows = logs.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["source"], "Full Aggregation");
    assert_eq!(rows[0]["status"], "success");
}

#[tokio::test]
async fn single_source_triggers_return_source_results() {
    let app = api::router(state(Duration::ZERO));
    for uri in ["/ingest/tools", "/ingest/news", "/ingest/trending"] {
        let (status, v) = send(&app, "POST", uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(v["success"], true, "{uri}");
        assert!(v.get("error").is_none(), "{uri}");
    }

    let (_, st) = send(&app, "GET", "/ingest/status").await;
    assert_eq!(st["is_running"], false);
    assert!(st["last_fetch"]["news"].is_string());
    assert!(st["next_scheduled"]["trending"].is_string());
}

#[tokio::test]
async fn run_while_running_is_409() {
    let st = state(Duration::from_millis(200));
    let app = api::router(st.clone());

    let agg = st.aggregator.clone();
    let bg = tokio::spawn(async move { agg.run_full_aggregation().await });
    while !st.aggregator.is_running() {
        tokio::task::yield_now().await;
    }

    let (status, v) = send(&app, "POST", "/ingest/run").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(v["error"].is_string());

    bg.await.unwrap();
}
