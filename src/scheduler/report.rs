//! Results of a scheduler cycle and the health snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::CollectionCounts;

/// What happened to one topic during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicOutcome {
    /// The rate limiter had no room; nothing was recorded.
    Skipped,
    Collected {
        attempt_id: String,
        counts: CollectionCounts,
    },
    Failed {
        /// None when the attempt record itself could not be created.
        attempt_id: Option<String>,
        error: String,
    },
}

/// Terminal state of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Completed,
    PartiallyFailed,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
        }
    }
}

/// Aggregate counts for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub topics_processed: u32,
    pub successful_collections: u32,
    pub failed_collections: u32,
    /// Topics passed over because the rate limiter was full.
    pub skipped_topics: u32,
    pub total_items_collected: u64,
    /// One `"{topic name}: {error}"` entry per failed topic.
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            topics_processed: 0,
            successful_collections: 0,
            failed_collections: 0,
            skipped_topics: 0,
            total_items_collected: 0,
            errors: Vec::new(),
            started_at,
            completed_at: started_at,
        }
    }

    /// Fold one topic's outcome into the totals.
    pub fn record(&mut self, topic_name: &str, outcome: &TopicOutcome) {
        match outcome {
            TopicOutcome::Skipped => self.skipped_topics += 1,
            TopicOutcome::Collected { counts, .. } => {
                self.topics_processed += 1;
                self.successful_collections += 1;
                self.total_items_collected += u64::from(counts.new_items);
            }
            TopicOutcome::Failed { error, .. } => {
                self.topics_processed += 1;
                self.failed_collections += 1;
                self.errors.push(format!("{}: {}", topic_name, error));
            }
        }
    }

    pub fn finish(&mut self, completed_at: DateTime<Utc>) {
        self.completed_at = completed_at;
    }

    pub fn state(&self) -> CycleState {
        if self.failed_collections > 0 {
            CycleState::PartiallyFailed
        } else {
            CycleState::Completed
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Point-in-time view of the engine for operators.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub checked_at: DateTime<Utc>,
    pub database_ok: bool,
    pub database_error: Option<String>,
    /// None when no live probe was requested.
    pub api_probe: Option<Result<(), String>>,
    pub active_topics: usize,
    pub due_topics: usize,
    pub recent_attempts: usize,
    pub recent_errors: usize,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    pub fn healthy(&self) -> bool {
        self.database_ok && !matches!(self.api_probe, Some(Err(_)))
    }
}
