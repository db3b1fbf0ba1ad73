// src/ingest/providers/trending.rs
//! Trending-listing scraper.
//!
//! The listing markup is not stable, so every field is read through an
//! ordered table of selector strategies; the first one that yields a
//! non-empty value wins. New markup variants only need a new table row.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::ingest::fetch::PageFetcher;
use crate::ingest::types::{SourceBatch, ToolCandidate, ToolCategory, ToolSource};
use crate::ingest::{collapse_ws, non_empty};

pub const SOURCE_LABEL: &str = "GitHub Trending";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extract {
    /// Text of the first matching element.
    Text,
    /// `href` of the first matching element.
    Href,
    /// Text of the first matching element whose text contains the needle.
    TextContaining(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct Strategy {
    selector: &'static str,
    extract: Extract,
}

const fn text(selector: &'static str) -> Strategy {
    Strategy {
        selector,
        extract: Extract::Text,
    }
}

const fn href(selector: &'static str) -> Strategy {
    Strategy {
        selector,
        extract: Extract::Href,
    }
}

const fn containing(selector: &'static str, needle: &'static str) -> Strategy {
    Strategy {
        selector,
        extract: Extract::TextContaining(needle),
    }
}

const ROW_SELECTORS: &[&str] = &["li.repo-list-item", "article.Box-row", ".repo-list li"];

const NAME: &[Strategy] = &[text("h2 a"), text("h3 a"), text("a[href^='/']")];
const LINK: &[Strategy] = &[href("h2 a"), href("h3 a"), href("a[href^='/']")];
const DESCRIPTION: &[Strategy] = &[text("p")];
const LANGUAGE: &[Strategy] = &[
    text("[itemprop='programmingLanguage']"),
    text(".repo-language-color + span"),
    text("span.color-fg-default"),
    text(".d-inline-block span"),
];
const STARS: &[Strategy] = &[text("a[href*='stargazers']"), text("a.Link--muted")];
const STARS_TODAY: &[Strategy] = &[
    containing(".float-right", "stars today"),
    containing("span.d-inline-block.float-sm-right", "stars today"),
    containing(".d-inline-block span.text-gray-dark", "stars today"),
];

/// A strategy table with its selectors compiled. Rows whose selector does not
/// parse are skipped.
struct FieldStrategies(Vec<(Selector, Extract)>);

impl FieldStrategies {
    fn compile(table: &[Strategy]) -> Self {
        Self(
            table
                .iter()
                .filter_map(|s| match Selector::parse(s.selector) {
                    Ok(sel) => Some((sel, s.extract)),
                    Err(e) => {
                        tracing::warn!(target: "ingest", selector = s.selector, error = ?e, "bad selector");
                        None
                    }
                })
                .collect(),
        )
    }

    fn first(&self, row: ElementRef<'_>) -> Option<String> {
        self.0.iter().find_map(|(sel, extract)| match extract {
            Extract::Text => row
                .select(sel)
                .next()
                .and_then(|el| non_empty(&element_text(el))),
            Extract::Href => row
                .select(sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(non_empty),
            Extract::TextContaining(needle) => row
                .select(sel)
                .map(element_text)
                .find(|t| t.to_lowercase().contains(needle))
                .and_then(|t| non_empty(&t)),
        })
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<String>())
}

/// One row of the listing, before relevance filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendingEntry {
    pub name: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub stars: u64,
    /// Stars gained in the listing period. Listing-only: tools carry the
    /// total in `popularity`.
    pub stars_today: u64,
}

impl TrendingEntry {
    pub fn into_candidate(self, now: DateTime<Utc>) -> ToolCandidate {
        let category = categorize_repo(&self.name, &self.description);
        let mut c = ToolCandidate::new(self.name, self.link.clone(), category, SOURCE_LABEL);
        c.description = non_empty(&self.description);
        let mut tags = Vec::with_capacity(3);
        if !self.language.is_empty() {
            tags.push(self.language);
        }
        tags.push("GitHub".to_string());
        tags.push("open-source".to_string());
        c.tags = tags;
        c.pricing = Some("free".to_string());
        c.popularity = Some(self.stars);
        c.publish_date = Some(now.date_naive());
        c.github_url = non_empty(&self.link);
        c
    }
}

/// Textual star count to a number: thousands separators are ignored, a `K`
/// suffix scales by 1000, no number at all is zero.
pub fn parse_stars(raw: &str) -> u64 {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(k)?").unwrap());

    let cleaned = raw.replace([',', '_'], "");
    let Some(caps) = re.captures(&cleaned) else {
        return 0;
    };
    let n: f64 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0);
    let scaled = if caps.get(2).is_some() { n * 1000.0 } else { n };
    scaled.round().max(0.0) as u64
}

const AI_KEYWORDS: &[&str] = &[
    "ai",
    "artificial intelligence",
    "machine learning",
    "deep learning",
    "neural",
    "llm",
    "gpt",
    "transformer",
    "nlp",
    "computer vision",
    "chatbot",
    "generative",
    "diffusion",
    "stable diffusion",
    "midjourney",
    "tensorflow",
    "pytorch",
    "huggingface",
    "langchain",
    "autogpt",
    "copilot",
    "code assistant",
    "text generation",
    "image generation",
    "voice",
    "speech",
    "audio generation",
    "music generation",
];

/// Topical relevance: any keyword as a case-insensitive substring.
pub fn is_ai_related(text: &str) -> bool {
    let lower = text.to_lowercase();
    AI_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn category_rules() -> &'static [(ToolCategory, Regex)] {
    static RULES: OnceCell<Vec<(ToolCategory, Regex)>> = OnceCell::new();
    RULES.get_or_init(|| {
        [
            (
                ToolCategory::Text,
                r"(?i)\b(gpt|llm|chatbot|conversation|text.*generation|language.*model)\b",
            ),
            (
                ToolCategory::Image,
                r"(?i)\b(stable.?diffusion|midjourney|image.*generation|diffusion|art.*generator|picture|visual)\b",
            ),
            (ToolCategory::Video, r"(?i)\b(video|motion|animation|frame)\b"),
            (ToolCategory::Audio, r"(?i)\b(audio|speech|voice|tts|music|sound)\b"),
            (
                ToolCategory::Code,
                r"(?i)\b(code|programming|developer|copilot|assistant|cli|tool)\b",
            ),
            (
                ToolCategory::Data,
                r"(?i)\b(search|research|data|analytics|knowledge|rag)\b",
            ),
        ]
        .into_iter()
        .map(|(cat, pat)| (cat, Regex::new(pat).unwrap()))
        .collect()
    })
}

/// Priority-ordered regex rules; `code` when nothing matches.
pub fn categorize_repo(name: &str, description: &str) -> ToolCategory {
    let text = format!("{name} {description}");
    category_rules()
        .iter()
        .find(|(_, re)| re.is_match(&text))
        .map(|(cat, _)| *cat)
        .unwrap_or(ToolCategory::Code)
}

/// Every row with a name, in page order. `origin` resolves relative links.
pub fn scrape_listing(html: &str, origin: &Url) -> Vec<TrendingEntry> {
    let doc = Html::parse_document(html);

    let rows: Vec<ElementRef<'_>> = ROW_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .map(|sel| doc.select(&sel).collect::<Vec<_>>())
        .find(|rows| !rows.is_empty())
        .unwrap_or_default();

    let f_name = FieldStrategies::compile(NAME);
    let f_link = FieldStrategies::compile(LINK);
    let f_description = FieldStrategies::compile(DESCRIPTION);
    let f_language = FieldStrategies::compile(LANGUAGE);
    let f_stars = FieldStrategies::compile(STARS);
    let f_stars_today = FieldStrategies::compile(STARS_TODAY);

    rows.into_iter()
        .filter_map(|row| {
            // "owner / repo" -> "owner/repo"
            let name: String = f_name.first(row)?.split_whitespace().collect();
            let link = f_link
                .first(row)
                .and_then(|h| origin.join(&h).ok())
                .map(|u| u.to_string())
                .unwrap_or_default();
            Some(TrendingEntry {
                name,
                link,
                description: f_description.first(row).unwrap_or_default(),
                language: f_language.first(row).unwrap_or_default(),
                stars: f_stars.first(row).map(|s| parse_stars(&s)).unwrap_or(0),
                stars_today: f_stars_today
                    .first(row)
                    .map(|s| parse_stars(&s))
                    .unwrap_or(0),
            })
        })
        .collect()
}

/// Listing page to relevant, categorized candidates.
pub fn parse_trending_page(html: &str, origin: &Url, now: DateTime<Utc>) -> Vec<ToolCandidate> {
    let t0 = std::time::Instant::now();
    let out = scrape_listing(html, origin)
        .into_iter()
        .filter(|e| is_ai_related(&format!("{} {} {}", e.name, e.description, e.language)))
        .map(|e| e.into_candidate(now))
        .collect();
    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    out
}

/// Outcome for one (language, period) page.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendingResult {
    pub candidates: Vec<ToolCandidate>,
    pub success: bool,
    pub warning: Option<String>,
    pub error: Option<String>,
}

pub struct TrendingScraper {
    fetcher: Arc<dyn PageFetcher>,
    base_url: String,
    languages: Vec<String>,
    since: String,
}

impl TrendingScraper {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        base_url: impl Into<String>,
        languages: Vec<String>,
        since: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            languages,
            since: since.into(),
        }
    }

    pub async fn fetch_trending(&self, language: &str, since: &str) -> TrendingResult {
        let url = match Url::parse_with_params(&self.base_url, &[("l", language), ("since", since)]) {
            Ok(u) => u,
            Err(e) => {
                return TrendingResult {
                    candidates: Vec::new(),
                    success: false,
                    warning: None,
                    error: Some(format!("bad trending url: {e}")),
                }
            }
        };
        tracing::info!(target: "ingest", %language, %since, "fetching trending listing");

        match self.fetcher.get_text(url.as_str()).await {
            Ok(body) => {
                let candidates = parse_trending_page(&body, &url, Utc::now());
                tracing::info!(target: "ingest", %language, relevant = candidates.len(), "trending ok");
                TrendingResult {
                    candidates,
                    success: true,
                    warning: None,
                    error: None,
                }
            }
            Err(e) if e.is_transport() => {
                tracing::warn!(target: "ingest", %language, error = %e, "trending unreachable; treating as empty");
                counter!("ingest_feed_failures_total").increment(1);
                TrendingResult {
                    candidates: Vec::new(),
                    success: true,
                    warning: Some(format!("network unreachable: {e}")),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(target: "ingest", %language, error = %e, "trending fetch failed");
                counter!("ingest_feed_failures_total").increment(1);
                TrendingResult {
                    candidates: Vec::new(),
                    success: false,
                    warning: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// All configured languages in order, deduplicated by link (first wins).
    /// Failed and unreachable pages end up in `warnings` as `lang: reason`.
    pub async fn fetch_all_languages(&self) -> SourceBatch<ToolCandidate> {
        let mut all = Vec::new();
        let mut warnings = Vec::new();
        for lang in &self.languages {
            let res = self.fetch_trending(lang, &self.since).await;
            if let Some(reason) = res.error.or(res.warning) {
                warnings.push(format!("{lang}: {reason}"));
            }
            if res.success {
                all.extend(res.candidates);
            }
        }
        let unique = dedup_by_link(all);
        tracing::info!(
            target: "ingest",
            total = unique.len(),
            failed_languages = warnings.len(),
            "trending languages done"
        );
        SourceBatch::new(unique, warnings)
    }
}

/// Keep the first candidate per website.
pub fn dedup_by_link(items: Vec<ToolCandidate>) -> Vec<ToolCandidate> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|c| seen.insert(c.website.clone()))
        .collect()
}

#[async_trait]
impl ToolSource for TrendingScraper {
    async fn fetch_tools(&self) -> Result<SourceBatch<ToolCandidate>> {
        Ok(self.fetch_all_languages().await)
    }

    fn name(&self) -> &'static str {
        SOURCE_LABEL
    }
}
