// src/ingest/mod.rs
pub mod categorize;
pub mod config;
pub mod dates;
pub mod fetch;
pub mod providers;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_items_fetched_total",
            "Items produced by a source pipeline."
        );
        describe_counter!(
            "ingest_items_saved_total",
            "Items accepted by the store (insert or merge)."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Source pipelines that failed as a whole."
        );
        describe_counter!(
            "ingest_feed_failures_total",
            "Single feeds or listing pages that could not be fetched or parsed."
        );
        describe_counter!("ingest_http_errors_total", "Failed HTTP requests.");
        describe_counter!("ingest_runs_total", "Full aggregation runs by final status.");
        describe_histogram!("ingest_parse_ms", "Feed/listing parse time in milliseconds.");
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when the last full aggregation finished."
        );
    });
}

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|</?[^>]+>").unwrap())
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Markup to plain text: decode entities, drop tags (and script/style
/// bodies), collapse whitespace, trim. Decoding first also strips markup that
/// arrived entity-escaped.
pub fn strip_html(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let no_tags = re_tags().replace_all(&decoded, " ");
    re_ws().replace_all(&no_tags, " ").trim().to_string()
}

/// Collapse internal whitespace and trim.
pub fn collapse_ws(s: &str) -> String {
    re_ws().replace_all(s, " ").trim().to_string()
}

/// Cut to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// `None` for empty/whitespace-only strings, trimmed otherwise.
pub(crate) fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_drops_tags_and_decodes() {
        let s = "<p>Hello&nbsp;&amp; <b>world</b></p>\n<script>var x = 1;</script>  ok";
        assert_eq!(strip_html(s), "Hello & world ok");
    }

    #[test]
    fn strip_html_handles_escaped_markup() {
        let s = "&lt;p&gt;Caf&eacute; &amp;amp; bar &lt;b&gt;today&lt;/b&gt;&lt;/p&gt;";
        assert_eq!(strip_html(s), "Café &amp; bar today");
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty("  x "), Some("x".to_string()));
        assert_eq!(non_empty("   "), None);
    }
}
