//! Candidate evaluation: validation, dedup, then classification and scoring.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use super::classifier::ContentClassifier;
use super::dedup::SeenIndex;
use super::validator::{extract_domain, ContentValidator};
use crate::models::{
    CandidateItem, ConfidenceThresholds, ConfidenceTier, NewContentRecord,
};

/// Why a candidate was rejected as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    BadUrl,
    TooShort,
    /// Accepted but could not be persisted.
    StoreFailed,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadUrl => "bad_url",
            Self::TooShort => "too_short",
            Self::StoreFailed => "store_failed",
        }
    }
}

/// Outcome of evaluating one candidate.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// New content, already claimed in the dedup index.
    Accepted(Box<NewContentRecord>),
    Duplicate,
    Invalid(InvalidReason),
}

/// Turns candidates into scored records, rejecting bad and repeated ones.
#[derive(Clone)]
pub struct ContentPipeline {
    validator: ContentValidator,
    classifier: ContentClassifier,
    thresholds: ConfidenceThresholds,
    seen: Arc<dyn SeenIndex>,
}

impl ContentPipeline {
    pub fn new(
        validator: ContentValidator,
        classifier: ContentClassifier,
        thresholds: ConfidenceThresholds,
        seen: Arc<dyn SeenIndex>,
    ) -> Self {
        Self {
            validator,
            classifier,
            thresholds,
            seen,
        }
    }

    /// Evaluate a candidate collected for `search_query`.
    ///
    /// An accepted record has its URL and content registered in the dedup
    /// index immediately, so a later candidate in the same batch (or from a
    /// concurrently collected topic) is reported as a duplicate.
    pub fn evaluate(
        &self,
        candidate: &CandidateItem,
        topic_id: Option<&str>,
        search_query: &str,
    ) -> Verdict {
        if !self.validator.validate_url(&candidate.url) {
            warn!("Invalid URL format: {}", candidate.url);
            return Verdict::Invalid(InvalidReason::BadUrl);
        }
        if !self.validator.validate_content_length(&candidate.snippet) {
            debug!(
                "Content too short: {} chars ({})",
                candidate.snippet.chars().count(),
                candidate.url
            );
            return Verdict::Invalid(InvalidReason::TooShort);
        }

        let record = self.score(candidate, topic_id, search_query);

        if !self.seen.claim(&record.source_url, &record.content) {
            debug!("Duplicate found: {}", record.source_url);
            return Verdict::Duplicate;
        }
        Verdict::Accepted(Box::new(record))
    }

    /// Give back the dedup claim of a record that was not stored.
    pub fn release(&self, record: &NewContentRecord) {
        self.seen.release(&record.source_url, &record.content);
    }

    /// Register already-stored content so it is reported as a duplicate.
    pub fn mark_known<I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut count = 0;
        for (url, content) in keys {
            self.seen.mark(&url, &content);
            count += 1;
        }
        count
    }

    fn score(
        &self,
        candidate: &CandidateItem,
        topic_id: Option<&str>,
        search_query: &str,
    ) -> NewContentRecord {
        let domain = extract_domain(&candidate.url).unwrap_or_default();
        let source_type = self.classifier.classify_source_type(&domain);
        let content = candidate.snippet.clone();

        let confidence_score = self.validator.calculate_confidence_score(
            &content,
            &candidate.url,
            &domain,
            source_type,
        );
        let relevance_score = self
            .classifier
            .calculate_relevance_score(&content, search_query);
        let tags = self.classifier.extract_tags(&content, &candidate.title);

        NewContentRecord {
            topic_id: topic_id.map(str::to_string),
            search_query: search_query.to_string(),
            source_url: candidate.url.clone(),
            source_title: candidate.title.clone(),
            source_domain: domain,
            source_type,
            content,
            full_answer: Some(candidate.full_answer.clone()),
            metadata: json!({
                "citation_number": candidate.metadata.citation_number,
                "source": candidate.metadata.source,
                "collected_at": candidate.metadata.collected_at.to_rfc3339(),
            }),
            relevance_score,
            confidence_score,
            confidence_tier: ConfidenceTier::from_score(confidence_score, &self.thresholds),
            tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::dedup::DedupCache;
    use crate::models::{CandidateMetadata, SourceType};
    use chrono::Utc;

    fn pipeline() -> (ContentPipeline, Arc<DedupCache>) {
        let cache = Arc::new(DedupCache::new());
        let p = ContentPipeline::new(
            ContentValidator::default(),
            ContentClassifier::new(),
            ConfidenceThresholds::default(),
            cache.clone(),
        );
        (p, cache)
    }

    fn candidate(url: &str, snippet: &str) -> CandidateItem {
        CandidateItem {
            url: url.to_string(),
            title: "Climate report".to_string(),
            snippet: snippet.to_string(),
            full_answer: format!("[1] {} {}", url, snippet),
            metadata: CandidateMetadata {
                citation_number: 1,
                source: "perplexity".to_string(),
                collected_at: Utc::now(),
            },
        }
    }

    const BODY: &str =
        "Global carbon emissions reached a new record this year according to climate scientists.";

    #[test]
    fn test_accepts_and_scores() {
        let (p, _) = pipeline();
        let verdict = p.evaluate(
            &candidate("https://www.reuters.com/climate/1", BODY),
            Some("topic-1"),
            "carbon emissions",
        );
        let Verdict::Accepted(record) = verdict else {
            panic!("expected accepted, got {verdict:?}");
        };
        assert_eq!(record.source_domain, "www.reuters.com");
        assert_eq!(record.source_type, SourceType::News);
        assert_eq!(record.topic_id.as_deref(), Some("topic-1"));
        assert_eq!(record.tags, vec!["climate"]);
        // 0.5 + 0.2 quality + 0.2 news + 0.05 url
        assert!((record.confidence_score - 0.95).abs() < 1e-9);
        assert_eq!(record.confidence_tier, ConfidenceTier::High);
        assert_eq!(record.relevance_score, 1.0);
        assert_eq!(record.metadata["citation_number"], 1);
    }

    #[test]
    fn test_rejects_invalid() {
        let (p, cache) = pipeline();
        assert!(matches!(
            p.evaluate(&candidate("not-a-url", BODY), None, "q"),
            Verdict::Invalid(InvalidReason::BadUrl)
        ));
        assert!(matches!(
            p.evaluate(&candidate("https://a.com", "too short"), None, "q"),
            Verdict::Invalid(InvalidReason::TooShort)
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_intra_batch_duplicates() {
        let (p, _) = pipeline();
        assert!(matches!(
            p.evaluate(&candidate("https://a.com/x", BODY), None, "q"),
            Verdict::Accepted(_)
        ));
        // Same URL, different body.
        let other = format!("{} Extra sentence.", BODY);
        assert!(matches!(
            p.evaluate(&candidate("https://a.com/x", &other), None, "q"),
            Verdict::Duplicate
        ));
        // Different URL, same body modulo case and spacing.
        let shouty = BODY.to_uppercase().replace(' ', "   ");
        assert!(matches!(
            p.evaluate(&candidate("https://b.com/y", &shouty), None, "q"),
            Verdict::Duplicate
        ));
    }

    #[test]
    fn test_release_allows_retry() {
        let (p, _) = pipeline();
        let Verdict::Accepted(record) = p.evaluate(&candidate("https://a.com/x", BODY), None, "q")
        else {
            panic!("expected accepted");
        };
        p.release(&record);
        assert!(matches!(
            p.evaluate(&candidate("https://a.com/x", BODY), None, "q"),
            Verdict::Accepted(_)
        ));
    }

    #[test]
    fn test_known_content_is_duplicate() {
        let (p, cache) = pipeline();
        let primed = p.mark_known(vec![("https://a.com/x".to_string(), BODY.to_string())]);
        assert_eq!(primed, 1);
        assert_eq!(cache.len(), (1, 1));
        assert!(matches!(
            p.evaluate(&candidate("https://c.com/z", BODY), None, "q"),
            Verdict::Duplicate
        ));
    }
}
