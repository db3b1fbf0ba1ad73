//! radar-ingest: binary entrypoint.
//! Boots the Axum trigger surface, the background scheduler and the metrics endpoint.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use radar_ingest::api::{self, AppState};
use radar_ingest::ingest::config::load_config_default;
use radar_ingest::ingest::scheduler::spawn_scheduler;
use radar_ingest::metrics::Metrics;
use radar_ingest::{Aggregator, InMemoryStore, Store};

/// `RUST_LOG` wins when set; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("radar_ingest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    // The runtime may already have installed a subscriber.
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already set");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = load_config_default().context("loading ingest config")?;
    tracing::info!(
        target: "ingest",
        feeds = cfg.rss_feeds.len(),
        languages = cfg.trending_languages.len(),
        max_concurrent = cfg.max_concurrent_requests,
        "config loaded"
    );

    let metrics = Metrics::init()?;

    let store = Arc::new(InMemoryStore::new());
    let aggregator = Arc::new(
        Aggregator::from_config(&cfg, store.clone() as Arc<dyn Store>)
            .context("building aggregator")?,
    );

    let _handles = spawn_scheduler(aggregator.clone(), cfg.intervals);

    let router = api::router(AppState { aggregator, store }).merge(metrics.router());

    Ok(router.into())
}
