//! store.rs: storage seam for ingested tools, news and the fetch log.
//!
//! Upserts are keyed by natural key (exact, case-sensitive) and merge with
//! coalesce semantics: a field present on the incoming draft wins, an absent
//! one keeps what is already stored.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::types::{FetchLogEntry, NewsItemDraft, ToolCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Merged,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_tool(&self, tool: &ToolCandidate) -> Result<UpsertOutcome>;
    async fn upsert_news(&self, item: &NewsItemDraft) -> Result<UpsertOutcome>;
    async fn append_fetch_log(&self, entry: FetchLogEntry) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredTool {
    pub id: u64,
    #[serde(flatten)]
    pub tool: ToolCandidate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredNews {
    pub id: u64,
    #[serde(flatten)]
    pub item: NewsItemDraft,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    tools: Vec<StoredTool>,
    news: Vec<StoredNews>,
    logs: Vec<FetchLogEntry>,
}

impl Tables {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store. Each upsert runs under one lock, so it is atomic per record.
#[derive(Debug)]
pub struct InMemoryStore {
    inner: Mutex<Tables>,
    log_cap: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_log_capacity(10_000)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
            log_cap: cap.max(1),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        self.inner.lock().map_err(|_| anyhow!("store mutex poisoned"))
    }

    pub fn tools(&self) -> Vec<StoredTool> {
        self.lock().map(|t| t.tools.clone()).unwrap_or_default()
    }

    pub fn news(&self) -> Vec<StoredNews> {
        self.lock().map(|t| t.news.clone()).unwrap_or_default()
    }

    /// Newest last, at most `limit` rows.
    pub fn recent_logs(&self, limit: usize) -> Vec<FetchLogEntry> {
        self.lock()
            .map(|t| {
                let start = t.logs.len().saturating_sub(limit);
                t.logs[start..].to_vec()
            })
            .unwrap_or_default()
    }
}

fn coalesce<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        slot.clone_from(incoming);
    }
}

fn merge_tool(stored: &mut ToolCandidate, incoming: &ToolCandidate) {
    coalesce(&mut stored.description, &incoming.description);
    coalesce(&mut stored.full_description, &incoming.full_description);
    stored.category = incoming.category;
    if !incoming.tags.is_empty() {
        stored.tags.clone_from(&incoming.tags);
    }
    coalesce(&mut stored.popularity, &incoming.popularity);
    coalesce(&mut stored.rating, &incoming.rating);
}

fn merge_news(stored: &mut NewsItemDraft, incoming: &NewsItemDraft) {
    if !incoming.summary.is_empty() {
        stored.summary.clone_from(&incoming.summary);
    }
    coalesce(&mut stored.read_count, &incoming.read_count);
    coalesce(&mut stored.like_count, &incoming.like_count);
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_tool(&self, tool: &ToolCandidate) -> Result<UpsertOutcome> {
        if !tool.has_natural_key() {
            return Err(anyhow!("tool is missing name or website"));
        }
        let now = Utc::now();
        let mut t = self.lock()?;
        if let Some(row) = t
            .tools
            .iter_mut()
            .find(|r| r.tool.name == tool.name && r.tool.website == tool.website)
        {
            merge_tool(&mut row.tool, tool);
            row.updated_at = now;
            return Ok(UpsertOutcome::Merged);
        }
        let id = t.alloc_id();
        t.tools.push(StoredTool {
            id,
            tool: tool.clone(),
            created_at: now,
            updated_at: now,
        });
        Ok(UpsertOutcome::Inserted)
    }

    async fn upsert_news(&self, item: &NewsItemDraft) -> Result<UpsertOutcome> {
        if !item.has_natural_key() {
            return Err(anyhow!("news item is missing title or source url"));
        }
        let now = Utc::now();
        let mut t = self.lock()?;
        if let Some(row) = t
            .news
            .iter_mut()
            .find(|r| r.item.title == item.title && r.item.source_url == item.source_url)
        {
            merge_news(&mut row.item, item);
            row.updated_at = now;
            return Ok(UpsertOutcome::Merged);
        }
        let id = t.alloc_id();
        t.news.push(StoredNews {
            id,
            item: item.clone(),
            created_at: now,
            updated_at: now,
        });
        Ok(UpsertOutcome::Inserted)
    }

    async fn append_fetch_log(&self, entry: FetchLogEntry) -> Result<()> {
        let mut t = self.lock()?;
        t.logs.push(entry);
        if t.logs.len() > self.log_cap {
            let excess = t.logs.len() - self.log_cap;
            t.logs.drain(0..excess);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{FetchStatus, ToolCategory};

    fn log(source: &str) -> FetchLogEntry {
        FetchLogEntry {
            source: source.into(),
            status: FetchStatus::Success,
            items_fetched: 0,
            items_saved: 0,
            duration_ms: 1,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn natural_key_is_case_sensitive() {
        let s = InMemoryStore::new();
        let a = ToolCandidate::new("Cursor", "https://cursor.sh", ToolCategory::Code, "t");
        let b = ToolCandidate::new("cursor", "https://cursor.sh", ToolCategory::Code, "t");
        assert_eq!(s.upsert_tool(&a).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(s.upsert_tool(&b).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(s.tools().len(), 2);
    }

    #[tokio::test]
    async fn missing_key_is_rejected() {
        let s = InMemoryStore::new();
        let t = ToolCandidate::new("", "https://x.test", ToolCategory::Code, "t");
        assert!(s.upsert_tool(&t).await.is_err());
        assert!(s.tools().is_empty());
    }

    #[tokio::test]
    async fn log_is_capped_and_ordered() {
        let s = InMemoryStore::with_log_capacity(2);
        for src in ["a", "b", "c"] {
            s.append_fetch_log(log(src)).await.unwrap();
        }
        let rows = s.recent_logs(10);
        let names: Vec<_> = rows.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(names, ["b", "c"]);
        assert_eq!(s.recent_logs(1)[0].source, "c");
    }
}
