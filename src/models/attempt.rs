//! Collection attempts: the append-only audit trail of collector calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final status of a collection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    RateLimited,
    Error,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RateLimited => "rate_limited",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "rate_limited" => Some(Self::RateLimited),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query-shaping mode for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// First collection for a topic: ask for a recent window.
    Initial,
    /// Follow-up collection: ask for what changed since the last check.
    Incremental,
    /// Reserved; no scheduling path selects it yet.
    GapFill,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Incremental => "incremental",
            Self::GapFill => "gap_fill",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(Self::Initial),
            "incremental" => Some(Self::Incremental),
            "gap_fill" => Some(Self::GapFill),
            _ => None,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-attempt tallies of what happened to the candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionCounts {
    pub total_results: u32,
    pub new_items: u32,
    pub duplicate_items: u32,
    pub invalid_items: u32,
}

/// Attempt row created when a collection starts.
#[derive(Debug, Clone)]
pub struct NewCollectionAttempt {
    /// None for manual runs not tied to a stored topic.
    pub topic_id: Option<String>,
    pub query_used: String,
    pub strategy: Strategy,
    pub metadata: serde_json::Value,
}

/// Values written once when an attempt completes.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub status: AttemptStatus,
    pub counts: CollectionCounts,
    pub api_calls_used: u32,
    pub error_message: Option<String>,
    pub error_trace: Option<String>,
}

impl AttemptOutcome {
    pub fn success(counts: CollectionCounts, api_calls_used: u32) -> Self {
        Self {
            status: AttemptStatus::Success,
            counts,
            api_calls_used,
            error_message: None,
            error_trace: None,
        }
    }

    pub fn failed(
        status: AttemptStatus,
        api_calls_used: u32,
        message: impl Into<String>,
        trace: impl Into<String>,
    ) -> Self {
        Self {
            status,
            counts: CollectionCounts::default(),
            api_calls_used,
            error_message: Some(message.into()),
            error_trace: Some(trace.into()),
        }
    }
}

/// Audit record of one collector call.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionAttempt {
    pub id: String,
    pub topic_id: Option<String>,
    pub status: AttemptStatus,
    pub query_used: String,
    pub strategy: Strategy,
    pub counts: CollectionCounts,
    pub api_calls_used: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_trace: Option<String>,
    pub metadata: serde_json::Value,
}

impl CollectionAttempt {
    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Wall-clock duration, once completed.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }
}
