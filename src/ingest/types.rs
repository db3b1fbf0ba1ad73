// src/ingest/types.rs
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Categories a discovered tool can land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolCategory {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "data")]
    Data,
    #[serde(rename = "office")]
    Office,
    #[serde(rename = "translate")]
    Translate,
    #[serde(rename = "3d")]
    ThreeD,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 9] = [
        ToolCategory::Text,
        ToolCategory::Image,
        ToolCategory::Video,
        ToolCategory::Audio,
        ToolCategory::Code,
        ToolCategory::Data,
        ToolCategory::Office,
        ToolCategory::Translate,
        ToolCategory::ThreeD,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ToolCategory::Text => "text",
            ToolCategory::Image => "image",
            ToolCategory::Video => "video",
            ToolCategory::Audio => "audio",
            ToolCategory::Code => "code",
            ToolCategory::Data => "data",
            ToolCategory::Office => "office",
            ToolCategory::Translate => "translate",
            ToolCategory::ThreeD => "3d",
        }
    }
}

/// Categories an industry news item can land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsCategory {
    Tech,
    Finance,
    Health,
    Education,
    Entertainment,
    Manufacturing,
    Energy,
    Ecommerce,
}

impl NewsCategory {
    pub const ALL: [NewsCategory; 8] = [
        NewsCategory::Tech,
        NewsCategory::Finance,
        NewsCategory::Health,
        NewsCategory::Education,
        NewsCategory::Entertainment,
        NewsCategory::Manufacturing,
        NewsCategory::Energy,
        NewsCategory::Ecommerce,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            NewsCategory::Tech => "tech",
            NewsCategory::Finance => "finance",
            NewsCategory::Health => "health",
            NewsCategory::Education => "education",
            NewsCategory::Entertainment => "entertainment",
            NewsCategory::Manufacturing => "manufacturing",
            NewsCategory::Energy => "energy",
            NewsCategory::Ecommerce => "ecommerce",
        }
    }
}

/// Either kind of category. The configured keyword table mixes both, so the
/// categorizer works on this and callers narrow it back down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Tool(ToolCategory),
    News(NewsCategory),
}

impl Category {
    pub fn slug(self) -> &'static str {
        match self {
            Category::Tool(c) => c.slug(),
            Category::News(c) => c.slug(),
        }
    }

    pub fn from_slug(s: &str) -> Option<Self> {
        let s = s.trim();
        ToolCategory::ALL
            .iter()
            .find(|c| c.slug().eq_ignore_ascii_case(s))
            .map(|c| Category::Tool(*c))
            .or_else(|| {
                NewsCategory::ALL
                    .iter()
                    .find(|c| c.slug().eq_ignore_ascii_case(s))
                    .map(|c| Category::News(*c))
            })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// A news item produced by the feed normalizer, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItemDraft {
    pub title: String,
    /// Plain text, at most 500 characters.
    pub summary: String,
    /// Raw (HTML) body as found in the feed.
    pub content: String,
    pub source_name: String,
    pub source_url: String,
    pub category: NewsCategory,
    pub tags: BTreeSet<String>,
    pub author: Option<String>,
    pub publish_time: DateTime<Utc>,
    pub image_url: Option<String>,
    pub read_count: Option<u64>,
    pub like_count: Option<u64>,
}

impl NewsItemDraft {
    /// Both halves of the (title, source_url) key are present.
    pub fn has_natural_key(&self) -> bool {
        !self.title.trim().is_empty() && !self.source_url.trim().is_empty()
    }
}

/// A tool produced by the trending scraper or the catalog seeder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCandidate {
    pub name: String,
    pub website: String,
    pub category: ToolCategory,
    pub subcategory: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub full_description: Option<String>,
    pub pricing: Option<String>,
    pub pricing_model: Option<String>,
    pub logo_url: Option<String>,
    pub screenshots: Vec<String>,
    pub github_url: Option<String>,
    pub popularity: Option<u64>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub publish_date: Option<NaiveDate>,
    pub source: String,
    pub external_id: Option<String>,
}

impl ToolCandidate {
    /// Bare candidate with only the required fields set.
    pub fn new(
        name: impl Into<String>,
        website: impl Into<String>,
        category: ToolCategory,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            website: website.into(),
            category,
            subcategory: None,
            tags: Vec::new(),
            description: None,
            full_description: None,
            pricing: None,
            pricing_model: None,
            logo_url: None,
            screenshots: Vec::new(),
            github_url: None,
            popularity: None,
            rating: None,
            review_count: None,
            publish_date: None,
            source: source.into(),
            external_id: None,
        }
    }

    /// Both halves of the (name, website) key are present.
    pub fn has_natural_key(&self) -> bool {
        !self.name.trim().is_empty() && !self.website.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Error,
    Partial,
}

/// One row of the ingestion audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchLogEntry {
    pub source: String,
    pub status: FetchStatus,
    pub items_fetched: usize,
    pub items_saved: usize,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one source pipeline, as returned by the public triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResult {
    pub success: bool,
    pub total_fetched: usize,
    pub total_saved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            total_fetched: 0,
            total_saved: 0,
            error: Some(error.into()),
        }
    }
}

/// The three independent ingestion paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Tools,
    News,
    Trending,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Tools, SourceKind::News, SourceKind::Trending];

    /// Label written to fetch logs and error entries.
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Tools => "AI Tools",
            SourceKind::News => "RSS Feeds",
            SourceKind::Trending => "GitHub Trending",
        }
    }
}

/// What a source produced in one run. `warnings` names the parts (one feed,
/// one language page) that failed without sinking the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch<T> {
    pub items: Vec<T>,
    pub warnings: Vec<String>,
}

impl<T> SourceBatch<T> {
    pub fn new(items: Vec<T>, warnings: Vec<String>) -> Self {
        Self { items, warnings }
    }
}

impl<T> From<Vec<T>> for SourceBatch<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items, Vec::new())
    }
}

/// Produces news drafts for one run.
#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_news(&self) -> anyhow::Result<SourceBatch<NewsItemDraft>>;
    fn name(&self) -> &'static str;
}

/// Produces tool candidates for one run.
#[async_trait::async_trait]
pub trait ToolSource: Send + Sync {
    async fn fetch_tools(&self) -> anyhow::Result<SourceBatch<ToolCandidate>>;
    fn name(&self) -> &'static str;
}
