//! Keyword heuristics for source type, tags and relevance.

use std::collections::HashSet;

use crate::models::{SourceType, MAX_TAGS};

/// Domain substrings per source type, checked in this order.
const SOURCE_TYPE_RULES: &[(SourceType, &[&str])] = &[
    (
        SourceType::News,
        &["news", "reuters", "bbc", "cnn", "nytimes", "guardian", "wsj"],
    ),
    (
        SourceType::Government,
        &["gov", "europa.eu", "who.int", "un.org"],
    ),
    (
        SourceType::SocialMedia,
        &["twitter", "facebook", "linkedin", "reddit", "youtube"],
    ),
    (SourceType::Forum, &["forum", "discussion", "community"]),
    (SourceType::Blog, &["blog", "medium", "substack"]),
];

/// Tag vocabulary. A tag applies when any of its keywords is a substring of
/// the lower-cased title and body.
const TAG_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "climate",
        &["climate", "global warming", "carbon", "emissions", "greenhouse"],
    ),
    (
        "technology",
        &["ai", "artificial intelligence", "tech", "software", "digital"],
    ),
    (
        "health",
        &["health", "medical", "healthcare", "pandemic", "vaccine"],
    ),
    (
        "economy",
        &["economy", "economic", "financial", "market", "recession"],
    ),
    (
        "politics",
        &["political", "government", "policy", "election", "democracy"],
    ),
    (
        "environment",
        &["environment", "environmental", "pollution", "sustainability"],
    ),
    (
        "security",
        &["security", "cybersecurity", "privacy", "data protection"],
    ),
    (
        "education",
        &["education", "school", "university", "learning", "student"],
    ),
];

/// Relevance returned when the query has no words.
const NEUTRAL_RELEVANCE: f64 = 0.5;
/// Flat boost added to the word-overlap ratio.
const RELEVANCE_BOOST: f64 = 0.3;

/// Classifies content and assigns tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentClassifier;

impl ContentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// First matching rule wins; no match is `Unknown`.
    pub fn classify_source_type(&self, domain: &str) -> SourceType {
        if domain.is_empty() {
            return SourceType::Unknown;
        }
        let domain = domain.to_lowercase();
        SOURCE_TYPE_RULES
            .iter()
            .find(|(_, indicators)| indicators.iter().any(|i| domain.contains(i)))
            .map(|(source_type, _)| *source_type)
            .unwrap_or(SourceType::Unknown)
    }

    /// Tags in vocabulary order, at most `MAX_TAGS`.
    pub fn extract_tags(&self, content: &str, title: &str) -> Vec<String> {
        let text = format!("{} {}", title, content).to_lowercase();
        TAG_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(tag, _)| tag.to_string())
            .take(MAX_TAGS)
            .collect()
    }

    /// Share of query words present in the content, plus a flat boost.
    pub fn calculate_relevance_score(&self, content: &str, query: &str) -> f64 {
        let query = query.to_lowercase();
        let query_words: HashSet<&str> = query.split_whitespace().collect();
        if query_words.is_empty() {
            return NEUTRAL_RELEVANCE;
        }

        let content = content.to_lowercase();
        let content_words: HashSet<&str> = content.split_whitespace().collect();
        let overlap = query_words.intersection(&content_words).count();

        let relevance = overlap as f64 / query_words.len() as f64;
        (relevance + RELEVANCE_BOOST).min(1.0)
    }
}
