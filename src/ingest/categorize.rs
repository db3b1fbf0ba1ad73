// src/ingest/categorize.rs
//! Keyword categorizer shared by the feed and listing parsers.
//!
//! The table is walked in its defined order and the first category with a
//! keyword contained in the (lower-cased) text wins. Order is a tie-break,
//! not a score.

use crate::ingest::types::Category;

/// One row of a keyword table: a category and the keywords that select it.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRule<C> {
    pub category: C,
    pub keywords: Vec<String>,
}

/// Ordered keyword table. Keywords are stored lower-cased.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordTable<C> {
    rules: Vec<KeywordRule<C>>,
}

impl<C: Copy + PartialEq> KeywordTable<C> {
    pub fn new<I, K, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = (C, K)>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = rules
            .into_iter()
            .map(|(category, kws)| KeywordRule {
                category,
                keywords: kws
                    .into_iter()
                    .map(|k| k.as_ref().trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[KeywordRule<C>] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// First matching category not in `excluded`, else `default`.
pub fn classify<C: Copy + PartialEq>(
    text: &str,
    table: &KeywordTable<C>,
    excluded: &[C],
    default: C,
) -> C {
    let lower = text.to_lowercase();
    table
        .rules
        .iter()
        .filter(|rule| !excluded.contains(&rule.category))
        .find(|rule| rule.keywords.iter().any(|k| lower.contains(k.as_str())))
        .map(|rule| rule.category)
        .unwrap_or(default)
}

/// The built-in mapping: tool categories first, then news categories.
pub fn default_keyword_table() -> KeywordTable<Category> {
    use crate::ingest::types::{NewsCategory as N, ToolCategory as T};

    KeywordTable::new([
        (Category::Tool(T::Text), vec!["writing", "text", "chatbot", "llm", "language model"]),
        (Category::Tool(T::Image), vec!["image", "art", "design", "generation", "creative"]),
        (Category::Tool(T::Video), vec!["video", "video generation", "motion"]),
        (Category::Tool(T::Audio), vec!["audio", "music", "speech", "voice", "tts"]),
        (Category::Tool(T::Code), vec!["code", "programming", "developer", "coding"]),
        (Category::Tool(T::Data), vec!["data", "analytics", "research", "search"]),
        (Category::Tool(T::Office), vec!["office", "productivity", "presentation", "notes"]),
        (Category::Tool(T::Translate), vec!["translate", "language", "multilingual"]),
        (Category::Tool(T::ThreeD), vec!["3d", "3d model", "modeling", "geometry"]),
        (Category::News(N::Tech), vec!["technology", "tech", "innovation", "software", "hardware"]),
        (Category::News(N::Finance), vec!["finance", "business", "investment", "market", "stock"]),
        (Category::News(N::Health), vec!["health", "medical", "healthcare", "biotech", "pharma"]),
        (Category::News(N::Education), vec!["education", "learning", "edtech", "school", "university"]),
        (
            Category::News(N::Entertainment),
            vec!["entertainment", "media", "streaming", "gaming", "game"],
        ),
        (
            Category::News(N::Manufacturing),
            vec!["manufacturing", "industrial", "robotics", "automation"],
        ),
        (
            Category::News(N::Energy),
            vec!["energy", "renewable", "sustainability", "carbon", "climate"],
        ),
        (
            Category::News(N::Ecommerce),
            vec!["ecommerce", "e-commerce", "retail", "shopping", "consumer"],
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{NewsCategory, ToolCategory};

    fn tools() -> Vec<Category> {
        ToolCategory::ALL.iter().map(|c| Category::Tool(*c)).collect()
    }

    #[test]
    fn first_match_in_table_order_wins() {
        let table = KeywordTable::new([("a", vec!["shared"]), ("b", vec!["shared", "only-b"])]);
        assert_eq!(classify("A Shared thing", &table, &[], "none"), "a");
        assert_eq!(classify("only-b here", &table, &[], "none"), "b");
    }

    #[test]
    fn excluded_categories_are_skipped() {
        let table = default_keyword_table();
        // "text" would hit the tool category first; news pipeline excludes it.
        let got = classify(
            "New text tools for the stock market",
            &table,
            &tools(),
            Category::News(NewsCategory::Tech),
        );
        assert_eq!(got, Category::News(NewsCategory::Finance));
    }

    #[test]
    fn falls_back_to_default() {
        let table = default_keyword_table();
        let got = classify("zzz", &table, &tools(), Category::News(NewsCategory::Tech));
        assert_eq!(got, Category::News(NewsCategory::Tech));
    }

    #[test]
    fn matching_is_case_insensitive_on_both_sides() {
        let table = KeywordTable::new([(1u8, vec!["GPU"])]);
        assert_eq!(classify("new gpu launch", &table, &[], 0), 1);
    }

    #[test]
    fn repeated_calls_are_stable() {
        let table = default_keyword_table();
        let text = "Renewable energy startup raises funding";
        let first = classify(text, &table, &tools(), Category::News(NewsCategory::Tech));
        for _ in 0..10 {
            assert_eq!(
                classify(text, &table, &tools(), Category::News(NewsCategory::Tech)),
                first
            );
        }
    }
}
