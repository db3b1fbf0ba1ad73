// src/ingest/dates.rs
//! Publish-time resolution for feed items.
//!
//! Grammars are tried in a fixed order and the first one that parses wins.
//! When none does, the ingestion instant is used so every item stays orderable.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use time::format_description::well_known::{Iso8601, Rfc2822, Rfc3339};
use time::OffsetDateTime;

type Grammar = fn(&str) -> Option<DateTime<Utc>>;

const GRAMMARS: &[(&str, Grammar)] = &[
    ("rfc2822", rfc2822),
    ("rfc2822-lenient", rfc2822_lenient),
    ("rfc3339", rfc3339),
    ("iso8601", iso8601),
    ("naive-space", naive_space),
    ("naive-t", naive_t),
    ("named-zone", named_zone),
    ("date-only", date_only),
];

fn from_offset(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

fn rfc2822(s: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(s, &Rfc2822).ok().and_then(from_offset)
}

// chrono accepts obsolete zone names (GMT, EST, ...) and a missing weekday.
fn rfc2822_lenient(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn rfc3339(s: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(s, &Rfc3339).ok().and_then(from_offset)
}

fn iso8601(s: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(s, &Iso8601::DEFAULT)
        .ok()
        .and_then(from_offset)
}

fn naive_space(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| Utc.from_utc_datetime(&n))
}

fn naive_t(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| Utc.from_utc_datetime(&n))
}

/// `EEE, dd MMM yyyy HH:mm:ss ZZZ` where ZZZ is a zone abbreviation.
fn named_zone(s: &str) -> Option<DateTime<Utc>> {
    let (head, zone) = s.trim().rsplit_once(' ')?;
    let hours = match zone.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        "CET" => 1,
        "CEST" | "EET" => 2,
        "EEST" => 3,
        "IST" => return with_offset_secs(head, 5 * 3600 + 1800),
        "JST" | "KST" => 9,
        "AEST" => 10,
        _ => return None,
    };
    with_offset_secs(head, hours * 3600)
}

fn with_offset_secs(head: &str, secs: i32) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(head, "%a, %d %b %Y %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(head, "%d %b %Y %H:%M:%S"))
        .ok()?;
    let offset = FixedOffset::east_opt(secs)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn date_only(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| Utc.from_utc_datetime(&n))
}

/// First grammar that accepts `raw`, if any.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    GRAMMARS.iter().find_map(|(name, g)| {
        let out = g(s);
        if out.is_some() {
            tracing::trace!(target: "ingest", grammar = name, "date parsed");
        }
        out
    })
}

/// Parsed publish time, or `now` when the value is missing or unparsable.
pub fn resolve_publish_time(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    match raw.and_then(parse_date) {
        Some(dt) => dt,
        None => {
            if let Some(r) = raw.filter(|r| !r.trim().is_empty()) {
                tracing::debug!(target: "ingest", raw = r, "unparsable date; using ingestion time");
            }
            now
        }
    }
}
