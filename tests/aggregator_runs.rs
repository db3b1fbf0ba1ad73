// tests/aggregator_runs.rs
//
// Orchestrator behaviour against fake sources: failure isolation, fetch logs,
// single-flight and run status.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use radar_ingest::aggregator::{AggregationOutcome, Aggregator, RunStatus, FULL_AGGREGATION_LABEL};
use radar_ingest::ingest::categorize::default_keyword_table;
use radar_ingest::ingest::config::{FetchIntervals, MAX_INTERVAL_HOURS};
use radar_ingest::ingest::fetch::FixtureFetcher;
use radar_ingest::ingest::providers::feeds::FeedFetcher;
use radar_ingest::ingest::types::{
    FetchStatus, NewsCategory, NewsItemDraft, NewsSource, SourceBatch, SourceKind, ToolCandidate,
    ToolCategory, ToolSource,
};
use radar_ingest::store::{InMemoryStore, Store};

struct FakeNews {
    items: Vec<NewsItemDraft>,
}

#[async_trait]
impl NewsSource for FakeNews {
    async fn fetch_news(&self) -> Result<SourceBatch<NewsItemDraft>> {
        Ok(self.items.clone().into())
    }
    fn name(&self) -> &'static str {
        "fake news"
    }
}

struct FakeTools {
    items: Vec<ToolCandidate>,
    fail: bool,
    delay: Duration,
}

#[async_trait]
impl ToolSource for FakeTools {
    async fn fetch_tools(&self) -> Result<SourceBatch<ToolCandidate>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(anyhow!("catalog exploded"));
        }
        Ok(self.items.clone().into())
    }
    fn name(&self) -> &'static str {
        "fake tools"
    }
}

struct PanickingTools;

#[async_trait]
impl ToolSource for PanickingTools {
    async fn fetch_tools(&self) -> Result<SourceBatch<ToolCandidate>> {
        panic!("selector table out of bounds");
    }
    fn name(&self) -> &'static str {
        "panicking tools"
    }
}

fn draft(title: &str, url: &str) -> NewsItemDraft {
    NewsItemDraft {
        title: title.into(),
        summary: "s".into(),
        content: String::new(),
        source_name: "Wire".into(),
        source_url: url.into(),
        category: NewsCategory::Tech,
        tags: BTreeSet::new(),
        author: None,
        publish_time: Utc::now(),
        image_url: None,
        read_count: None,
        like_count: None,
    }
}

fn tool(name: &str, website: &str) -> ToolCandidate {
    ToolCandidate::new(name, website, ToolCategory::Code, "test")
}

fn tools(items: Vec<ToolCandidate>) -> Box<FakeTools> {
    Box::new(FakeTools {
        items,
        fail: false,
        delay: Duration::ZERO,
    })
}

fn build(
    store: Arc<InMemoryStore>,
    news: Vec<NewsItemDraft>,
    catalog: Box<FakeTools>,
    trending: Box<FakeTools>,
) -> Aggregator {
    Aggregator::new(
        store as Arc<dyn Store>,
        FetchIntervals::default(),
        Box::new(FakeNews { items: news }),
        catalog,
        trending,
    )
}

#[tokio::test]
async fn one_failing_pipeline_leaves_the_others_intact() {
    let store = Arc::new(InMemoryStore::new());
    let agg = build(
        store.clone(),
        vec![draft("a", "https://n.test/a"), draft("b", "https://n.test/b")],
        Box::new(FakeTools {
            items: vec![],
            fail: true,
            delay: Duration::ZERO,
        }),
        tools(vec![tool("acme/agent", "https://github.com/acme/agent")]),
    );

    let AggregationOutcome::Finished(summary) = agg.run_full_aggregation().await else {
        panic!("first run cannot be busy");
    };
    assert_eq!(summary.status, RunStatus::CompletedWithErrors);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].source, SourceKind::Tools.label());
    assert!(summary.errors[0].error.contains("catalog exploded"));
    assert!(summary.tools.is_none());
    assert_eq!(summary.news.as_ref().map(|r| r.total_saved), Some(2));
    assert_eq!(summary.trending.as_ref().map(|r| r.total_saved), Some(1));

    assert_eq!(store.news().len(), 2);
    assert_eq!(store.tools().len(), 1);

    let logs = store.recent_logs(10);
    assert_eq!(logs.len(), 4, "three pipeline rows and one run row");
    let last = logs.last().unwrap();
    assert_eq!(last.source, FULL_AGGREGATION_LABEL);
    assert_eq!(last.status, FetchStatus::Partial);
    assert_eq!(last.items_fetched, 3);
    assert_eq!(last.items_saved, 3);
    assert!(last.error_message.as_deref().unwrap().contains("AI Tools"));

    let tools_row = logs.iter().find(|l| l.source == "AI Tools").unwrap();
    assert_eq!(tools_row.status, FetchStatus::Error);
}

#[tokio::test]
async fn drafts_without_natural_key_count_as_fetched_not_saved() {
    let store = Arc::new(InMemoryStore::new());
    let agg = build(
        store.clone(),
        vec![draft("kept", "https://n.test/k"), draft("no link", "")],
        tools(vec![tool("", "https://nameless.test")]),
        tools(vec![]),
    );

    let news = agg.run_news_ingestion().await;
    assert!(news.success);
    assert_eq!(news.total_fetched, 2);
    assert_eq!(news.total_saved, 1);

    let catalog = agg.run_tools_ingestion().await;
    assert_eq!(catalog.total_fetched, 1);
    assert_eq!(catalog.total_saved, 0);
    assert!(store.tools().is_empty());

    let rows = store.recent_logs(10);
    assert!(rows.iter().all(|r| r.status == FetchStatus::Success));
}

#[tokio::test]
async fn repeated_runs_do_not_duplicate_records() {
    let store = Arc::new(InMemoryStore::new());
    let agg = build(
        store.clone(),
        vec![draft("a", "https://n.test/a")],
        tools(vec![tool("Cursor", "https://cursor.sh")]),
        tools(vec![tool("acme/agent", "https://github.com/acme/agent")]),
    );
    for _ in 0..3 {
        assert!(matches!(agg.run_full_aggregation().await, AggregationOutcome::Finished(_)));
    }
    assert_eq!(store.news().len(), 1);
    assert_eq!(store.tools().len(), 2);
}

#[tokio::test]
async fn concurrent_trigger_is_busy_until_the_run_ends() {
    let store = Arc::new(InMemoryStore::new());
    let agg = Arc::new(build(
        store.clone(),
        vec![],
        Box::new(FakeTools {
            items: vec![tool("Slow", "https://slow.test")],
            fail: false,
            delay: Duration::from_millis(200),
        }),
        tools(vec![]),
    ));

    let first = tokio::spawn({
        let agg = agg.clone();
        async move { agg.run_full_aggregation().await }
    });
    while !agg.is_running() {
        tokio::task::yield_now().await;
    }

    assert_eq!(agg.run_full_aggregation().await, AggregationOutcome::Busy);
    assert!(agg.run_status().is_running);

    let done = first.await.unwrap();
    assert!(matches!(done, AggregationOutcome::Finished(_)));
    assert!(!agg.is_running());
    assert!(matches!(agg.run_full_aggregation().await, AggregationOutcome::Finished(_)));
}

#[tokio::test]
async fn status_reports_last_fetch_and_next_estimate() {
    let store = Arc::new(InMemoryStore::new());
    let agg = build(store, vec![draft("a", "https://n.test/a")], tools(vec![]), tools(vec![]));

    assert!(agg.run_status().last_fetch.is_empty());
    agg.run_news_ingestion().await;

    let status = agg.run_status();
    let last = status.last_fetch[&SourceKind::News];
    let next = status.next_scheduled[&SourceKind::News];
    assert_eq!(next - last, chrono::Duration::hours(6));
    assert!(!status.last_fetch.contains_key(&SourceKind::Tools));
}

#[tokio::test]
async fn failed_feed_marks_the_news_pipeline_partial() {
    const FEED: &str = "<rss><channel><title>Up</title><item><title>Alive</title>\
                        <link>https://up.test/1</link><description>ok</description>\
                        </item></channel></rss>";
    let fetcher = FixtureFetcher::new()
        .with_status("https://down.test/rss", 502)
        .with_page("https://up.test/rss", FEED);
    let feeds = FeedFetcher::new(
        Arc::new(fetcher),
        vec!["https://down.test/rss".into(), "https://up.test/rss".into()],
        default_keyword_table(),
    );
    let store = Arc::new(InMemoryStore::new());
    let agg = Aggregator::new(
        store.clone() as Arc<dyn Store>,
        FetchIntervals::default(),
        Box::new(feeds),
        tools(vec![]),
        tools(vec![]),
    );

    let res = agg.run_news_ingestion().await;
    assert!(res.success);
    assert_eq!(res.total_saved, 1);
    assert!(res.error.as_deref().unwrap().contains("https://down.test/rss"));

    let rows = store.recent_logs(10);
    let row = rows.iter().find(|r| r.source == "RSS Feeds").unwrap();
    assert_eq!(row.status, FetchStatus::Partial);
    let msg = row.error_message.as_deref().unwrap();
    assert!(msg.starts_with("https://down.test/rss: "), "{msg}");
    assert!(!msg.contains("up.test"));
}

#[tokio::test]
async fn every_feed_failing_is_not_a_success() {
    let fetcher = FixtureFetcher::new()
        .with_status("https://a.test/rss", 502)
        .with_status("https://b.test/rss", 503);
    let feeds = FeedFetcher::new(
        Arc::new(fetcher),
        vec!["https://a.test/rss".into(), "https://b.test/rss".into()],
        default_keyword_table(),
    );
    let store = Arc::new(InMemoryStore::new());
    let agg = Aggregator::new(
        store.clone() as Arc<dyn Store>,
        FetchIntervals::default(),
        Box::new(feeds),
        tools(vec![]),
        tools(vec![]),
    );

    let AggregationOutcome::Finished(_) = agg.run_full_aggregation().await else {
        panic!("first run cannot be busy");
    };
    let rows = store.recent_logs(10);
    let news_row = rows.iter().find(|r| r.source == "RSS Feeds").unwrap();
    assert_eq!(news_row.status, FetchStatus::Partial);
    let msg = news_row.error_message.as_deref().unwrap();
    assert_eq!(msg.split("; ").count(), 2, "{msg}");

    let run_row = rows.last().unwrap();
    assert_eq!(run_row.source, FULL_AGGREGATION_LABEL);
    assert_eq!(run_row.status, FetchStatus::Partial);
    assert!(run_row.error_message.as_deref().unwrap().contains("RSS Feeds: "));
}

#[tokio::test]
async fn panicking_source_is_reported_not_propagated() {
    let store = Arc::new(InMemoryStore::new());
    let agg = Aggregator::new(
        store.clone() as Arc<dyn Store>,
        FetchIntervals::default(),
        Box::new(FakeNews {
            items: vec![draft("a", "https://n.test/a")],
        }),
        Box::new(PanickingTools),
        tools(vec![tool("acme/agent", "https://github.com/acme/agent")]),
    );

    let AggregationOutcome::Finished(summary) = agg.run_full_aggregation().await else {
        panic!("first run cannot be busy");
    };
    assert!(!agg.is_running());
    assert_eq!(summary.status, RunStatus::CompletedWithErrors);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].source, "AI Tools");
    assert!(summary.errors[0].error.contains("panicked"));
    assert!(summary.errors[0].error.contains("selector table out of bounds"));
    assert_eq!(summary.news.as_ref().map(|r| r.total_saved), Some(1));
    assert_eq!(summary.trending.as_ref().map(|r| r.total_saved), Some(1));

    let rows = store.recent_logs(10);
    let tools_row = rows.iter().find(|r| r.source == "AI Tools").unwrap();
    assert_eq!(tools_row.status, FetchStatus::Error);

    let single = agg.run_tools_ingestion().await;
    assert!(!single.success);
    assert!(single.error.as_deref().unwrap().contains("panicked"));
}

#[tokio::test]
async fn huge_interval_does_not_overflow_the_estimate() {
    let store = Arc::new(InMemoryStore::new());
    let agg = Aggregator::new(
        store as Arc<dyn Store>,
        FetchIntervals {
            news_hours: 10_000_000_000_000,
            ..FetchIntervals::default()
        },
        Box::new(FakeNews {
            items: vec![draft("a", "https://n.test/a")],
        }),
        tools(vec![]),
        tools(vec![]),
    );

    assert!(agg.run_news_ingestion().await.success);
    let status = agg.run_status();
    let last = status.last_fetch[&SourceKind::News];
    let next = status.next_scheduled[&SourceKind::News];
    assert_eq!(next - last, chrono::Duration::hours(MAX_INTERVAL_HOURS as i64));
}
