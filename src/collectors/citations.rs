//! Extraction of candidate items from free-text search answers.
//!
//! Answers usually carry bracket-numbered citations (`[1] Title https://...`).
//! When none of those contain a URL, bare URLs in the text are used instead,
//! with the surrounding text standing in for a title and snippet.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::{CandidateItem, CandidateMetadata};

/// Longest snippet kept for a bracketed citation, in characters.
pub const MAX_SNIPPET_CHARS: usize = 500;
/// Characters of context kept on each side of a bare URL.
pub const FALLBACK_WINDOW_CHARS: usize = 100;
/// Most bare URLs turned into candidates from one answer.
pub const MAX_FALLBACK_URLS: usize = 10;

static RE_CITATION: OnceLock<Regex> = OnceLock::new();
static RE_URL: OnceLock<Regex> = OnceLock::new();

fn citation_re() -> &'static Regex {
    RE_CITATION.get_or_init(|| Regex::new(r"\[(\d+)\]\s*([^\[]+)").expect("citation pattern"))
}

fn url_re() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("url pattern"))
}

/// Strip punctuation that trails a URL in running prose.
pub fn clean_url(raw: &str) -> &str {
    raw.trim_end_matches(['.', ',', ';', ':', ')', ']'])
}

/// Parse an answer into candidates.
///
/// `source_urls` is the optional structured citation list some APIs return
/// next to the text; entry `n - 1` supplies the URL for a `[n]` marker whose
/// text has none.
pub fn parse_answer(
    answer: &str,
    source_urls: &[String],
    source: &str,
    collected_at: DateTime<Utc>,
) -> Vec<CandidateItem> {
    if answer.trim().is_empty() {
        return Vec::new();
    }

    let cited = parse_bracketed(answer, source_urls, source, collected_at);
    if !cited.is_empty() {
        return cited;
    }
    parse_bare_urls(answer, source, collected_at)
}

fn parse_bracketed(
    answer: &str,
    source_urls: &[String],
    source: &str,
    collected_at: DateTime<Utc>,
) -> Vec<CandidateItem> {
    let mut items = Vec::new();

    for caps in citation_re().captures_iter(answer) {
        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        let text = &caps[2];

        let (url, title) = match url_re().find(text) {
            Some(m) => {
                let title = text.replace(m.as_str(), "").trim().to_string();
                (clean_url(m.as_str()).to_string(), title)
            }
            None => {
                let listed = (number as usize)
                    .checked_sub(1)
                    .and_then(|i| source_urls.get(i));
                match listed {
                    Some(url) => (url.clone(), text.trim().to_string()),
                    None => continue,
                }
            }
        };

        let title = if title.is_empty() {
            format!("Citation {}", number)
        } else {
            title
        };

        items.push(CandidateItem {
            url,
            title,
            snippet: text.chars().take(MAX_SNIPPET_CHARS).collect(),
            full_answer: answer.to_string(),
            metadata: CandidateMetadata {
                citation_number: number,
                source: source.to_string(),
                collected_at,
            },
        });
    }

    items
}

fn parse_bare_urls(answer: &str, source: &str, collected_at: DateTime<Utc>) -> Vec<CandidateItem> {
    url_re()
        .find_iter(answer)
        .take(MAX_FALLBACK_URLS)
        .enumerate()
        .map(|(i, m)| {
            let number = i as u32 + 1;
            CandidateItem {
                url: clean_url(m.as_str()).to_string(),
                title: format!("Source {}", number),
                snippet: surrounding_text(answer, m.start(), m.end()),
                full_answer: answer.to_string(),
                metadata: CandidateMetadata {
                    citation_number: number,
                    source: source.to_string(),
                    collected_at,
                },
            }
        })
        .collect()
}

/// Up to `FALLBACK_WINDOW_CHARS` characters on each side of `start..end`.
fn surrounding_text(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(FALLBACK_WINDOW_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &text[end..];
    let to = end
        + tail
            .char_indices()
            .nth(FALLBACK_WINDOW_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(tail.len());
    text[from..to].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(answer: &str) -> Vec<CandidateItem> {
        parse_answer(answer, &[], "perplexity", Utc::now())
    }

    #[test]
    fn test_two_inline_citations() {
        let items = parse("See [1] https://a.com and more [2] https://b.com info");
        let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com", "https://b.com"]);
        assert_eq!(items[0].title, "and more");
        assert_eq!(items[1].title, "info");
        assert_eq!(items[0].metadata.citation_number, 1);
        assert_eq!(items[1].metadata.source, "perplexity");
    }

    #[test]
    fn test_citation_without_title_gets_default() {
        let items = parse("[3] https://example.org/report");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Citation 3");
    }

    #[test]
    fn test_trailing_punctuation_trimmed() {
        let items = parse("[1] Report (https://example.org/a).");
        assert_eq!(items[0].url, "https://example.org/a");
        assert_eq!(items[0].title, "Report (");
    }

    #[test]
    fn test_snippet_capped() {
        let long = "x".repeat(800);
        let items = parse(&format!("[1] https://a.com {}", long));
        assert_eq!(items[0].snippet.chars().count(), MAX_SNIPPET_CHARS);
    }

    #[test]
    fn test_markers_resolved_from_source_list() {
        let sources = vec![
            "https://one.example/a".to_string(),
            "https://two.example/b".to_string(),
        ];
        let items = parse_answer(
            "Emissions rose sharply [2] according to new data.",
            &sources,
            "perplexity",
            Utc::now(),
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://two.example/b");
        assert_eq!(items[0].metadata.citation_number, 2);
    }

    #[test]
    fn test_fallback_to_bare_urls() {
        let answer = "Coverage at https://news.example.com/story and https://other.example.org.";
        let items = parse(answer);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Source 1");
        assert_eq!(items[1].url, "https://other.example.org");
        assert!(items[0].snippet.contains("Coverage at"));
    }

    #[test]
    fn test_fallback_capped_at_ten() {
        let answer: String = (0..15)
            .map(|i| format!("https://site{}.example.com ", i))
            .collect();
        assert_eq!(parse(&answer).len(), MAX_FALLBACK_URLS);
    }

    #[test]
    fn test_fallback_window_is_char_safe() {
        let prefix = "é".repeat(150);
        let answer = format!("{} https://a.example.com {}", prefix, "ü".repeat(150));
        let items = parse(&answer);
        assert_eq!(items.len(), 1);
        let snippet = &items[0].snippet;
        assert!(snippet.contains("https://a.example.com"));
        assert_eq!(
            snippet.chars().count(),
            "https://a.example.com".len() + 2 * FALLBACK_WINDOW_CHARS
        );
    }

    #[test]
    fn test_empty_answer() {
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
        assert!(parse("No links here [1] at all").is_empty());
    }
}
