// src/ingest/providers/feeds.rs
//! RSS 2.0 / Atom normalizer.
//!
//! Both dialects are read from the same payload: every `<item>` is parsed as
//! RSS and every `<entry>` as Atom, RSS first, each in document order. Items
//! without a title are dropped.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::{Html, Selector};

use crate::ingest::categorize::{classify, KeywordTable};
use crate::ingest::dates::resolve_publish_time;
use crate::ingest::fetch::PageFetcher;
use crate::ingest::types::{
    Category, NewsCategory, NewsItemDraft, NewsSource, SourceBatch, ToolCategory,
};
use crate::ingest::{collapse_ws, non_empty, strip_html, truncate_chars};

pub const SUMMARY_MAX_CHARS: usize = 500;

/* ----------------------------
Minimal element tree
---------------------------- */

#[derive(Debug, Default)]
struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn from_start(e: &BytesStart<'_>) -> Self {
        let attrs = e
            .attributes()
            .with_checks(false)
            .flatten()
            .map(|a| {
                let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                let value = a
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
                (key, value)
            })
            .collect();
        Self {
            name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            attrs,
            ..Self::default()
        }
    }

    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.is(name))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// Pre-order search over the whole subtree.
    fn descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a Node>) {
        for c in &self.children {
            if c.is(name) {
                out.push(c);
            }
            c.descendants(name, out);
        }
    }

    fn document_element(&self) -> Option<&Node> {
        self.children.iter().find(|c| c.name != TEXT_NODE)
    }

    fn inner_text(&self) -> String {
        let mut s = self.text.clone();
        for c in &self.children {
            s.push_str(&c.inner_text());
        }
        s
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).and_then(|c| non_empty(&c.inner_text()))
    }
}

fn push_child(stack: &mut [Node], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

const TEXT_NODE: &str = "#text";

/// Text after an element child becomes its own `#text` child so mixed
/// content (Atom `type="xhtml"`) keeps document order.
fn push_text(stack: &mut [Node], s: &str) {
    let Some(top) = stack.last_mut() else {
        return;
    };
    match top.children.last_mut() {
        None => top.text.push_str(s),
        Some(last) if last.name == TEXT_NODE => last.text.push_str(s),
        Some(_) => top.children.push(Node {
            name: TEXT_NODE.to_string(),
            text: s.to_string(),
            ..Node::default()
        }),
    }
}

fn parse_tree(xml: &str) -> Result<Node> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    let mut stack: Vec<Node> = vec![Node::default()];
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Node::from_start(&e)),
            Ok(Event::Empty(e)) => push_child(&mut stack, Node::from_start(&e)),
            Ok(Event::End(_)) => {
                if stack.len() > 1 {
                    if let Some(done) = stack.pop() {
                        push_child(&mut stack, done);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                // HTML-only entities (&eacute; ...) make the XML unescape fail
                // for the whole node.
                let s = t.unescape().map(|c| c.into_owned()).unwrap_or_else(|_| {
                    html_escape::decode_html_entities(&String::from_utf8_lossy(&t)).into_owned()
                });
                push_text(&mut stack, &s);
            }
            Ok(Event::CData(c)) => push_text(&mut stack, &String::from_utf8_lossy(&c)),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(anyhow!(
                    "xml error at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
        }
    }

    // Close anything left open by a truncated document.
    while stack.len() > 1 {
        if let Some(done) = stack.pop() {
            push_child(&mut stack, done);
        }
    }
    stack.pop().ok_or_else(|| anyhow!("empty document"))
}

/// Common HTML entities that are not valid XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&ldquo;", "&#8220;")
        .replace("&rdquo;", "&#8221;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rsquo;", "&#8217;")
        .replace("&hellip;", "&#8230;")
}

/* ----------------------------
Parsing
---------------------------- */

/// Result of parsing one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedParse {
    pub feed_title: Option<String>,
    pub items: Vec<NewsItemDraft>,
    /// Set when items were dropped or nothing was found.
    pub warning: Option<String>,
}

/// Everything `parse_feed` needs besides the payload.
pub struct FeedContext<'a> {
    pub source_label: &'a str,
    pub table: &'a KeywordTable<Category>,
    pub now: DateTime<Utc>,
}

/// Parse an RSS and/or Atom payload into news drafts.
pub fn parse_feed(raw: &[u8], ctx: &FeedContext<'_>) -> Result<FeedParse> {
    let t0 = std::time::Instant::now();
    let xml = scrub_html_entities_for_xml(&String::from_utf8_lossy(raw));
    let root = parse_tree(&xml).context("parsing feed xml")?;

    let mut rss_items = Vec::new();
    root.descendants("item", &mut rss_items);
    let mut atom_entries = Vec::new();
    root.descendants("entry", &mut atom_entries);

    let top = root.document_element();
    let looks_like_feed = top.is_some_and(|n| n.is("rss") || n.is("feed") || n.is("rdf:RDF"));
    if rss_items.is_empty() && atom_entries.is_empty() && !looks_like_feed {
        return Err(anyhow!("payload is neither RSS nor Atom"));
    }

    let feed_title = feed_title(&root);
    let source_name = feed_title
        .clone()
        .unwrap_or_else(|| ctx.source_label.to_string());

    let seen = rss_items.len() + atom_entries.len();
    let mut items = Vec::with_capacity(seen);
    items.extend(
        rss_items
            .into_iter()
            .filter_map(|it| parse_rss_item(it, &source_name, ctx)),
    );
    items.extend(
        atom_entries
            .into_iter()
            .filter_map(|it| parse_atom_entry(it, &source_name, ctx)),
    );

    let dropped = seen - items.len();
    let warning = if seen == 0 {
        Some("feed contains no items".to_string())
    } else if dropped > 0 {
        Some(format!("{dropped} item(s) without title dropped"))
    } else {
        None
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);

    Ok(FeedParse {
        feed_title,
        items,
        warning,
    })
}

fn feed_title(root: &Node) -> Option<String> {
    let top = root.document_element()?;
    let channel = if top.is("rss") || top.is("rdf:RDF") {
        top.child("channel")?
    } else {
        top
    };
    channel.child_text("title").map(|t| clean_line(&t))
}

fn clean_line(s: &str) -> String {
    collapse_ws(&html_escape::decode_html_entities(s))
}

fn longer(a: Option<String>, b: Option<String>) -> String {
    match (a, b) {
        (Some(a), Some(b)) => {
            if b.chars().count() > a.chars().count() {
                b
            } else {
                a
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => String::new(),
    }
}

fn summarize(body: &str) -> String {
    truncate_chars(&strip_html(body), SUMMARY_MAX_CHARS)
}

fn categorize(title: &str, summary: &str, ctx: &FeedContext<'_>) -> NewsCategory {
    let excluded: Vec<Category> = ToolCategory::ALL.iter().map(|c| Category::Tool(*c)).collect();
    let text = format!("{title} {summary}");
    match classify(&text, ctx.table, &excluded, Category::News(NewsCategory::Tech)) {
        Category::News(n) => n,
        Category::Tool(_) => NewsCategory::Tech,
    }
}

fn is_image_type(t: Option<&str>) -> bool {
    t.is_some_and(|t| t.to_ascii_lowercase().starts_with("image"))
}

/// `src` of the first `<img>` inside an HTML fragment.
pub fn first_image_src(html: &str) -> Option<String> {
    if !html.contains("<img") {
        return None;
    }
    let sel = Selector::parse("img[src]").ok()?;
    let frag = Html::parse_fragment(html);
    let src = frag
        .select(&sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(non_empty);
    src
}

fn enclosure_image(node: &Node) -> Option<String> {
    node.children
        .iter()
        .find(|c| {
            ((c.is("enclosure") || c.is("media:content")) && is_image_type(c.attr("type")))
                || c.is("media:thumbnail")
                || (c.is("link")
                    && c.attr("rel") == Some("enclosure")
                    && is_image_type(c.attr("type")))
        })
        .and_then(|c| c.attr("url").or_else(|| c.attr("href")))
        .and_then(non_empty)
}

fn parse_rss_item(it: &Node, source_name: &str, ctx: &FeedContext<'_>) -> Option<NewsItemDraft> {
    let title = clean_line(&it.child_text("title")?);
    if title.is_empty() {
        return None;
    }

    let link = it
        .child_text("link")
        .or_else(|| it.child_text("guid").filter(|g| g.starts_with("http")))
        .unwrap_or_default();

    let content = longer(it.child_text("description"), it.child_text("content:encoded"));
    let summary = summarize(&content);

    let raw_date = it.child_text("pubDate").or_else(|| it.child_text("dc:date"));
    let publish_time = resolve_publish_time(raw_date.as_deref(), ctx.now);

    let author = it
        .child_text("dc:creator")
        .or_else(|| it.child_text("author"))
        .map(|a| clean_line(&a));

    let tags: BTreeSet<String> = it
        .children_named("category")
        .filter_map(|c| non_empty(&c.inner_text()))
        .collect();

    let image_url = enclosure_image(it).or_else(|| first_image_src(&content));
    let category = categorize(&title, &summary, ctx);

    Some(NewsItemDraft {
        title,
        summary,
        content,
        source_name: source_name.to_string(),
        source_url: link,
        category,
        tags,
        author,
        publish_time,
        image_url,
        read_count: None,
        like_count: None,
    })
}

fn parse_atom_entry(it: &Node, source_name: &str, ctx: &FeedContext<'_>) -> Option<NewsItemDraft> {
    let title = clean_line(&it.child_text("title")?);
    if title.is_empty() {
        return None;
    }

    let link = it
        .children_named("link")
        .find(|l| l.attr("rel") == Some("alternate"))
        .or_else(|| it.children_named("link").find(|l| l.attr("href").is_some()))
        .and_then(|l| l.attr("href"))
        .and_then(non_empty)
        .unwrap_or_default();

    let content = longer(it.child_text("summary"), it.child_text("content"));
    let summary = summarize(&content);

    let raw_date = it
        .child_text("published")
        .or_else(|| it.child_text("updated"));
    let publish_time = resolve_publish_time(raw_date.as_deref(), ctx.now);

    let author = it
        .child("author")
        .and_then(|a| a.child_text("name"))
        .map(|a| clean_line(&a));

    let tags: BTreeSet<String> = it
        .children_named("category")
        .filter_map(|c| c.attr("term").and_then(non_empty))
        .collect();

    let image_url = enclosure_image(it).or_else(|| first_image_src(&content));
    let category = categorize(&title, &summary, ctx);

    Some(NewsItemDraft {
        title,
        summary,
        content,
        source_name: source_name.to_string(),
        source_url: link,
        category,
        tags,
        author,
        publish_time,
        image_url,
        read_count: None,
        like_count: None,
    })
}

/* ----------------------------
Fetching
---------------------------- */

/// Outcome for one feed URL. Failures are reported, never raised.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedResult {
    pub url: String,
    pub success: bool,
    pub items: Vec<NewsItemDraft>,
    pub feed_title: Option<String>,
    pub error: Option<String>,
}

/// All configured feeds, fetched one after another.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedBatch {
    pub items: Vec<NewsItemDraft>,
    pub duration_ms: u64,
    /// (feed url, error) for every feed that failed.
    pub failures: Vec<(String, String)>,
}

pub struct FeedFetcher {
    fetcher: Arc<dyn PageFetcher>,
    feeds: Vec<String>,
    table: KeywordTable<Category>,
}

impl FeedFetcher {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        feeds: Vec<String>,
        table: KeywordTable<Category>,
    ) -> Self {
        Self {
            fetcher,
            feeds,
            table,
        }
    }

    pub async fn fetch_feed(&self, url: &str) -> FeedResult {
        tracing::info!(target: "ingest", %url, "fetching feed");
        let outcome = match self.fetcher.get_text(url).await {
            Ok(body) => {
                let ctx = FeedContext {
                    source_label: url,
                    table: &self.table,
                    now: Utc::now(),
                };
                parse_feed(body.as_bytes(), &ctx)
            }
            Err(e) => Err(anyhow::Error::new(e).context("fetching feed")),
        };

        match outcome {
            Ok(parsed) => {
                if let Some(w) = &parsed.warning {
                    tracing::debug!(target: "ingest", %url, warning = %w, "feed parsed with warning");
                }
                tracing::info!(target: "ingest", %url, items = parsed.items.len(), "feed ok");
                FeedResult {
                    url: url.to_string(),
                    success: true,
                    items: parsed.items,
                    feed_title: parsed.feed_title,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(target: "ingest", %url, error = %format!("{e:#}"), "feed failed");
                counter!("ingest_feed_failures_total").increment(1);
                FeedResult {
                    url: url.to_string(),
                    success: false,
                    items: Vec::new(),
                    feed_title: None,
                    error: Some(format!("{e:#}")),
                }
            }
        }
    }

    pub async fn fetch_all_feeds(&self) -> FeedBatch {
        let t0 = std::time::Instant::now();
        let mut items = Vec::new();
        let mut failures = Vec::new();

        for url in &self.feeds {
            let res = self.fetch_feed(url).await;
            if res.success {
                items.extend(res.items);
            } else {
                failures.push((res.url, res.error.unwrap_or_default()));
            }
        }

        let duration_ms = t0.elapsed().as_millis() as u64;
        tracing::info!(
            target: "ingest",
            items = items.len(),
            failed_feeds = failures.len(),
            duration_ms,
            "all feeds fetched"
        );
        FeedBatch {
            items,
            duration_ms,
            failures,
        }
    }
}

#[async_trait]
impl NewsSource for FeedFetcher {
    async fn fetch_news(&self) -> Result<SourceBatch<NewsItemDraft>> {
        let batch = self.fetch_all_feeds().await;
        let warnings = batch
            .failures
            .into_iter()
            .map(|(url, err)| format!("{url}: {err}"))
            .collect();
        Ok(SourceBatch::new(batch.items, warnings))
    }

    fn name(&self) -> &'static str {
        "RSS Feeds"
    }
}
