// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::categorize::{default_keyword_table, KeywordTable};
use crate::ingest::types::Category;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/ingest.toml";
pub const DEFAULT_JSON_PATH: &str = "config/ingest.json";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_CONCURRENT: usize = 5;
/// One year.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365;
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn default_feeds() -> Vec<String> {
    [
        "https://techcrunch.com/feed/",
        "https://www.theverge.com/rss/index.xml",
        "https://blog.google/technology/ai/rss/",
        "https://openai.com/blog/rss.xml",
        "https://engineering.fb.com/feed/",
        "https://netflixtechblog.com/feed",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_languages() -> Vec<String> {
    ["javascript", "python", "typescript", "go", "rust", "java"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_trending_url() -> String {
    "https://github.com/trending".to_string()
}
fn default_since() -> String {
    "daily".to_string()
}
fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

/// Hours between fetches per source; also drives the advisory next-fetch estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchIntervals {
    #[serde(default = "FetchIntervals::default_tools")]
    pub tools_hours: u64,
    #[serde(default = "FetchIntervals::default_news")]
    pub news_hours: u64,
    #[serde(default = "FetchIntervals::default_trending")]
    pub trending_hours: u64,
}

impl FetchIntervals {
    fn default_tools() -> u64 {
        24
    }
    fn default_news() -> u64 {
        6
    }
    fn default_trending() -> u64 {
        24 * 7
    }
}

impl FetchIntervals {
    /// Zero falls back to the default, anything above `MAX_INTERVAL_HOURS` is
    /// capped so timer and timestamp arithmetic stays in range.
    pub fn clamped(self) -> Self {
        let d = Self::default();
        let fix = |h: u64, default: u64| if h == 0 { default } else { h.min(MAX_INTERVAL_HOURS) };
        Self {
            tools_hours: fix(self.tools_hours, d.tools_hours),
            news_hours: fix(self.news_hours, d.news_hours),
            trending_hours: fix(self.trending_hours, d.trending_hours),
        }
    }
}

impl Default for FetchIntervals {
    fn default() -> Self {
        Self {
            tools_hours: Self::default_tools(),
            news_hours: Self::default_news(),
            trending_hours: Self::default_trending(),
        }
    }
}

/// One entry of the ordered keyword table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryKeywords {
    pub slug: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_feeds")]
    pub rss_feeds: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_trending_url")]
    pub trending_url: String,
    #[serde(default = "default_languages")]
    pub trending_languages: Vec<String>,
    #[serde(default = "default_since")]
    pub trending_since: String,
    /// Upper bound on in-flight HTTP requests across all pipelines.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub intervals: FetchIntervals,
    /// Empty means the built-in table.
    #[serde(default)]
    pub categories: Vec<CategoryKeywords>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rss_feeds: default_feeds(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: default_user_agent(),
            trending_url: default_trending_url(),
            trending_languages: default_languages(),
            trending_since: default_since(),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT,
            intervals: FetchIntervals::default(),
            categories: Vec::new(),
        }
    }
}

impl IngestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Keyword table for the categorizer. Unknown slugs are skipped; if none
    /// of the configured rows survive, the built-in table is used.
    pub fn keyword_table(&self) -> KeywordTable<Category> {
        if self.categories.is_empty() {
            return default_keyword_table();
        }
        let rows = self.categories.iter().filter_map(|c| match Category::from_slug(&c.slug) {
            Some(cat) => Some((cat, c.keywords.clone())),
            None => {
                tracing::warn!(target: "ingest", slug = %c.slug, "unknown category slug in config; skipped");
                None
            }
        });
        let table = KeywordTable::new(rows);
        if table.is_empty() {
            tracing::warn!(target: "ingest", "no usable category rows in config; using built-in table");
            return default_keyword_table();
        }
        table
    }

    /// Apply recognised environment overrides on top of file/default values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("RSS_FEEDS") {
            let feeds: Vec<String> =
                serde_json::from_str(&raw).context("RSS_FEEDS must be a JSON array of URLs")?;
            self.rss_feeds = feeds;
        }
        if let Some(v) = env_parse::<u64>("REQUEST_TIMEOUT") {
            self.request_timeout_ms = v;
        }
        if let Ok(v) = std::env::var("GITHUB_TRENDING_URL") {
            self.trending_url = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_CONCURRENT_REQUESTS") {
            self.max_concurrent_requests = v;
        }
        if let Some(v) = env_parse::<u64>("FETCH_INTERVAL_AI_TOOLS") {
            self.intervals.tools_hours = v;
        }
        if let Some(v) = env_parse::<u64>("FETCH_INTERVAL_NEWS") {
            self.intervals.news_hours = v;
        }
        if let Some(v) = env_parse::<u64>("FETCH_INTERVAL_TRENDING") {
            self.intervals.trending_hours = v;
        }
        Ok(())
    }

    fn sanitize(mut self) -> Self {
        self.rss_feeds = clean_list(self.rss_feeds);
        self.trending_languages = clean_list(self.trending_languages);
        if self.request_timeout_ms == 0 {
            self.request_timeout_ms = DEFAULT_TIMEOUT_MS;
        }
        if self.max_concurrent_requests == 0 {
            self.max_concurrent_requests = DEFAULT_MAX_CONCURRENT;
        }
        if self.trending_since.trim().is_empty() {
            self.trending_since = default_since();
        }
        self.intervals = self.intervals.clamped();
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<IngestConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading ingest config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
}

/// Load config using env var + fallbacks:
/// 1) $INGEST_CONFIG_PATH
/// 2) config/ingest.toml
/// 3) config/ingest.json
/// 4) built-in defaults
///
/// Environment overrides are applied last in every case.
pub fn load_config_default() -> Result<IngestConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("INGEST_CONFIG_PATH points to non-existent path"));
        }
        load_config_from(&pb)?
    } else if Path::new(DEFAULT_TOML_PATH).exists() {
        load_config_from(Path::new(DEFAULT_TOML_PATH))?
    } else if Path::new(DEFAULT_JSON_PATH).exists() {
        load_config_from(Path::new(DEFAULT_JSON_PATH))?
    } else {
        IngestConfig::default()
    };
    cfg.apply_env_overrides()?;
    Ok(cfg.sanitize())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<IngestConfig> {
    let parsed = match hint_ext {
        "toml" => toml::from_str::<IngestConfig>(s).map_err(anyhow::Error::from),
        "json" => serde_json::from_str::<IngestConfig>(s).map_err(anyhow::Error::from),
        _ => serde_json::from_str::<IngestConfig>(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| toml::from_str::<IngestConfig>(s).map_err(anyhow::Error::from)),
    };
    parsed
        .map(IngestConfig::sanitize)
        .context("unsupported ingest config format")
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
