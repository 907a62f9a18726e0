//! Candidate items extracted from search answers and the records they become.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of tags stored on a record.
pub const MAX_TAGS: usize = 10;

/// Kind of site a piece of content came from, inferred from its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    News,
    Government,
    Blog,
    Forum,
    SocialMedia,
    Unknown,
}

impl SourceType {
    pub const ALL: [SourceType; 6] = [
        SourceType::News,
        SourceType::Government,
        SourceType::Blog,
        SourceType::Forum,
        SourceType::SocialMedia,
        SourceType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Government => "government",
            Self::Blog => "blog",
            Self::Forum => "forum",
            Self::SocialMedia => "social_media",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "news" => Some(Self::News),
            "government" => Some(Self::Government),
            "blog" => Some(Self::Blog),
            "forum" => Some(Self::Forum),
            "social_media" => Some(Self::SocialMedia),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Contribution of this source type to the confidence score.
    pub fn confidence_weight(&self) -> f64 {
        match self {
            Self::News => 0.2,
            Self::Government => 0.3,
            Self::Blog => 0.1,
            Self::Forum => 0.05,
            Self::SocialMedia => 0.05,
            Self::Unknown => 0.0,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score cut-offs used to bucket records by confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.5,
            low: 0.2,
        }
    }
}

/// Confidence bucket of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    /// Below the low threshold.
    Minimal,
}

impl ConfidenceTier {
    pub fn from_score(score: f64, thresholds: &ConfidenceThresholds) -> Self {
        if score >= thresholds.high {
            Self::High
        } else if score >= thresholds.medium {
            Self::Medium
        } else if score >= thresholds.low {
            Self::Low
        } else {
            Self::Minimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Minimal => "minimal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }
}

/// Where a candidate came from inside a search answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    /// Bracket number for parsed citations, 1-based position for bare URLs.
    pub citation_number: u32,
    /// Name of the collector that produced the candidate.
    pub source: String,
    pub collected_at: DateTime<Utc>,
}

/// Unvalidated extraction from one search answer.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Full answer text the candidate was extracted from.
    pub full_answer: String,
    pub metadata: CandidateMetadata,
}

/// A scored record ready to persist.
#[derive(Debug, Clone)]
pub struct NewContentRecord {
    pub topic_id: Option<String>,
    pub search_query: String,
    pub source_url: String,
    pub source_title: String,
    pub source_domain: String,
    pub source_type: SourceType,
    pub content: String,
    pub full_answer: Option<String>,
    pub metadata: serde_json::Value,
    pub relevance_score: f64,
    pub confidence_score: f64,
    pub confidence_tier: ConfidenceTier,
    pub tags: Vec<String>,
}

/// A persisted unit of collected content.
#[derive(Debug, Clone, Serialize)]
pub struct ContentRecord {
    pub id: String,
    pub topic_id: Option<String>,
    pub search_query: String,
    pub source_url: String,
    pub source_title: String,
    pub source_domain: String,
    pub source_type: SourceType,
    pub content: String,
    pub full_answer: Option<String>,
    pub metadata: serde_json::Value,
    pub relevance_score: f64,
    pub confidence_score: f64,
    pub confidence_tier: ConfidenceTier,
    pub tags: Vec<String>,
    pub collected_at: DateTime<Utc>,
    pub soft_deleted_at: Option<DateTime<Utc>>,
}

/// Aggregate numbers over stored content.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContentStats {
    pub total_records: u64,
    pub deleted_records: u64,
    pub average_confidence: Option<f64>,
    pub by_source_type: Vec<(String, u64)>,
    pub by_tier: Vec<(String, u64)>,
    pub unique_domains: u64,
}
