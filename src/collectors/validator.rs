//! Stateless quality checks and confidence scoring for candidate content.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::SourceType;

/// Domain substrings that mark a source as reasonably credible even when it
/// is not on the trusted list.
const QUALITY_INDICATORS: &[&str] = &[
    "news", "gov", "edu", "org", "reuters", "bbc", "cnn", "nytimes",
];

/// Domains trusted out of the box.
pub const DEFAULT_TRUSTED_DOMAINS: &[&str] = &[
    "reuters.com",
    "bbc.com",
    "cnn.com",
    "nytimes.com",
    "washingtonpost.com",
    "guardian.com",
    "wsj.com",
    "bloomberg.com",
    "ap.org",
    "npr.org",
    "gov.uk",
    "gov.au",
    "gov.ca",
    "europa.eu",
    "who.int",
    "un.org",
];

/// Configuration for content validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Minimum trimmed body length, in characters.
    pub min_content_length: usize,
    /// Domain suffixes accepted as high quality.
    pub trusted_domains: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_content_length: 50,
            trusted_domains: DEFAULT_TRUSTED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// Validates content quality and format.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    min_content_length: usize,
    trusted_domains: Vec<String>,
}

impl ContentValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            min_content_length: config.min_content_length,
            trusted_domains: config
                .trusted_domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Absolute URL with a scheme and a non-empty host.
    pub fn validate_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => {
                !parsed.scheme().is_empty()
                    && parsed.host_str().is_some_and(|host| !host.is_empty())
            }
            Err(_) => false,
        }
    }

    pub fn validate_content_length(&self, content: &str) -> bool {
        content.trim().chars().count() >= self.min_content_length
    }

    /// Trusted-suffix match, or a quality keyword anywhere in the domain.
    pub fn validate_source_quality(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }
        let domain = domain.to_lowercase();

        if self
            .trusted_domains
            .iter()
            .any(|trusted| domain.ends_with(trusted.as_str()))
        {
            return true;
        }
        QUALITY_INDICATORS
            .iter()
            .any(|indicator| domain.contains(indicator))
    }

    /// Additive heuristic, clamped to [0, 1].
    pub fn calculate_confidence_score(
        &self,
        content: &str,
        url: &str,
        domain: &str,
        source_type: SourceType,
    ) -> f64 {
        let mut score = 0.5;

        let length = content.chars().count();
        if length > 200 {
            score += 0.1;
        }
        if length > 500 {
            score += 0.1;
        }

        if self.validate_source_quality(domain) {
            score += 0.2;
        }

        score += source_type.confidence_weight();

        if self.validate_url(url) {
            score += 0.05;
        }

        f64::clamp(score, 0.0, 1.0)
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(&ValidatorConfig::default())
    }
}

/// Lower-cased host of `url`, if it parses.
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.to_lowercase()))
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        let v = ContentValidator::default();
        assert!(v.validate_url("https://www.reuters.com/world/article"));
        assert!(v.validate_url("http://example.com"));
        assert!(!v.validate_url("not a url"));
        assert!(!v.validate_url("/relative/path"));
        assert!(!v.validate_url("mailto:someone@example.com"));
        assert!(!v.validate_url(""));
    }

    #[test]
    fn test_validate_content_length() {
        let v = ContentValidator::default();
        assert!(v.validate_content_length(&"a".repeat(50)));
        assert!(!v.validate_content_length(&"a".repeat(49)));
        assert!(!v.validate_content_length(&format!("   {}   ", "a".repeat(49))));
    }

    #[test]
    fn test_source_quality() {
        let v = ContentValidator::default();
        assert!(v.validate_source_quality("www.reuters.com"));
        assert!(v.validate_source_quality("data.gov.uk"));
        assert!(v.validate_source_quality("localnews.example.com"));
        assert!(v.validate_source_quality("example.org"));
        assert!(!v.validate_source_quality("randomblog.example.com"));
        assert!(!v.validate_source_quality(""));
    }

    #[test]
    fn test_custom_trusted_domains() {
        let v = ContentValidator::new(&ValidatorConfig {
            min_content_length: 10,
            trusted_domains: vec!["Example.COM".to_string()],
        });
        assert!(v.validate_source_quality("www.example.com"));
        assert!(v.validate_content_length("0123456789"));
    }

    #[test]
    fn test_confidence_score_weights() {
        let v = ContentValidator::default();
        let short = "short";
        // 0.5 base + 0.05 url
        let s = v.calculate_confidence_score(
            short,
            "https://x.example",
            "x.example",
            SourceType::Unknown,
        );
        assert!((s - 0.55).abs() < 1e-9);

        // 0.5 + 0.1 + 0.2 quality + 0.1 blog + 0.05 url
        let medium = "m".repeat(300);
        let s = v.calculate_confidence_score(&medium, "https://a.org", "a.org", SourceType::Blog);
        assert!((s - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_score_clamped() {
        let v = ContentValidator::default();
        let long = "word ".repeat(200);
        let s = v.calculate_confidence_score(
            &long,
            "https://www.reuters.com/a",
            "www.reuters.com",
            SourceType::Government,
        );
        assert_eq!(s, 1.0);

        for (content, url, domain) in [("", "", ""), ("x", "::::", "??"), ("", "http://", "")] {
            for st in SourceType::ALL {
                let s = v.calculate_confidence_score(content, url, domain, st);
                assert!((0.0..=1.0).contains(&s));
            }
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://WWW.BBC.co.uk/news/1").as_deref(),
            Some("www.bbc.co.uk")
        );
        assert_eq!(extract_domain("nonsense"), None);
    }
}
