// tests/providers_trending.rs
use std::sync::Arc;

use chrono::Utc;
use radar_ingest::ingest::fetch::FixtureFetcher;
use radar_ingest::ingest::providers::trending::{
    parse_trending_page, scrape_listing, TrendingScraper, SOURCE_LABEL,
};
use radar_ingest::ingest::types::{ToolCategory, ToolSource};
use url::Url;

const LISTING: &str = include_str!("fixtures/trending.html");

fn origin() -> Url {
    Url::parse("https://github.com/trending?l=python&since=daily").unwrap()
}

#[test]
fn listing_rows_are_scraped_in_page_order() {
    let rows = scrape_listing(LISTING, &origin());
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].name, "acme/sd-webui");
    assert_eq!(rows[0].link, "https://github.com/acme/sd-webui");
    assert_eq!(rows[0].language, "Python");
    assert_eq!(rows[0].stars, 1_234);
    assert_eq!(rows[0].stars_today, 56);

    assert_eq!(rows[1].name, "bob/todo");
    assert_eq!(rows[1].stars, 2_100);
}

#[test]
fn only_relevant_repos_become_candidates() {
    let now = Utc::now();
    let out = parse_trending_page(LISTING, &origin(), now);
    assert_eq!(out.len(), 1);

    let c = &out[0];
    assert_eq!(c.name, "acme/sd-webui");
    assert_eq!(c.category, ToolCategory::Image);
    assert_eq!(c.source, SOURCE_LABEL);
    assert_eq!(c.popularity, Some(1_234));
    assert_eq!(c.pricing.as_deref(), Some("free"));
    assert_eq!(c.tags, vec!["Python", "GitHub", "open-source"]);
    assert_eq!(c.github_url.as_deref(), Some("https://github.com/acme/sd-webui"));
    assert_eq!(c.publish_date, Some(now.date_naive()));
}

#[tokio::test]
async fn languages_are_merged_and_deduplicated() {
    let fetcher = FixtureFetcher::new()
        .with_page("https://github.com/trending?l=python&since=daily", LISTING)
        .with_page("https://github.com/trending?l=rust&since=daily", LISTING)
        .with_status("https://github.com/trending?l=go&since=daily", 500);
    let scraper = TrendingScraper::new(
        Arc::new(fetcher),
        "https://github.com/trending",
        vec!["python".into(), "go".into(), "rust".into()],
        "daily",
    );

    let batch = scraper.fetch_tools().await.unwrap();
    assert_eq!(batch.items.len(), 1);
    assert_eq!(batch.items[0].website, "https://github.com/acme/sd-webui");
    assert_eq!(batch.warnings.len(), 1, "the go page failed");
    assert!(batch.warnings[0].starts_with("go: "));
}

#[tokio::test]
async fn unreachable_listing_is_an_empty_success() {
    let scraper = TrendingScraper::new(
        Arc::new(FixtureFetcher::new()),
        "https://github.com/trending",
        vec!["python".into()],
        "daily",
    );
    let res = scraper.fetch_trending("python", "daily").await;
    assert!(res.success);
    assert!(res.candidates.is_empty());
    assert!(res.warning.is_some());

    let failing = TrendingScraper::new(
        Arc::new(
            FixtureFetcher::new().with_status("https://github.com/trending?l=python&since=weekly", 429),
        ),
        "https://github.com/trending",
        vec![],
        "weekly",
    );
    let res = failing.fetch_trending("python", "weekly").await;
    assert!(!res.success);
    assert!(res.error.is_some());
}
