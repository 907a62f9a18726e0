//! Watched topics and their scheduling fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attempt::Strategy;

/// Lowest allowed check frequency.
pub const MIN_CHECK_FREQUENCY_HOURS: u32 = 1;
/// Highest allowed check frequency (one week).
pub const MAX_CHECK_FREQUENCY_HOURS: u32 = 168;

/// Collection priority of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    Normal,
    Low,
}

impl Priority {
    /// All priorities, highest first.
    pub const ALL: [Priority; 3] = [Priority::Critical, Priority::Normal, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Sort rank; lower runs first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subject under watch with its own query and schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub search_query: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub active: bool,
    pub priority: Priority,
    pub check_frequency_hours: u32,
    pub last_checked: Option<DateTime<Utc>>,
    /// Bumped every time the search query is edited.
    pub query_version: u32,
    pub total_posts_collected: u64,
    pub avg_posts_per_query: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Topic {
    /// Whether the topic should be collected at `now`.
    ///
    /// Inactive topics are never due. A topic that has never been checked is
    /// always due; otherwise it is due once `check_frequency_hours` have
    /// elapsed since the last check.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.last_checked {
            None => true,
            Some(last) => {
                let elapsed_secs = (now - last).num_seconds();
                elapsed_secs >= i64::from(self.check_frequency_hours) * 3600
            }
        }
    }

    /// Strategy to use for the next collection, based on history.
    pub fn next_strategy(&self) -> Strategy {
        match self.last_checked {
            None => Strategy::Initial,
            Some(_) => Strategy::Incremental,
        }
    }
}

/// Errors raised when a topic definition is rejected.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TopicError {
    #[error("topic name must not be empty")]
    EmptyName,

    #[error("search query must not be empty")]
    EmptyQuery,

    #[error(
        "check frequency {0}h is outside {}..={}",
        MIN_CHECK_FREQUENCY_HOURS,
        MAX_CHECK_FREQUENCY_HOURS
    )]
    FrequencyOutOfRange(u32),

    #[error("unknown priority: {0}")]
    UnknownPriority(String),
}

/// Definition of a topic to insert.
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub name: String,
    pub search_query: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub active: bool,
    pub priority: Priority,
    pub check_frequency_hours: u32,
}

impl NewTopic {
    pub fn new(
        name: impl Into<String>,
        search_query: impl Into<String>,
        priority: Priority,
        check_frequency_hours: u32,
    ) -> Self {
        Self {
            name: name.into(),
            search_query: search_query.into(),
            description: None,
            category: None,
            active: true,
            priority,
            check_frequency_hours,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn validate(&self) -> Result<(), TopicError> {
        if self.name.trim().is_empty() {
            return Err(TopicError::EmptyName);
        }
        if self.search_query.trim().is_empty() {
            return Err(TopicError::EmptyQuery);
        }
        validate_check_frequency(self.check_frequency_hours)
    }
}

/// Check that a frequency lies in the allowed window.
pub fn validate_check_frequency(hours: u32) -> Result<(), TopicError> {
    if (MIN_CHECK_FREQUENCY_HOURS..=MAX_CHECK_FREQUENCY_HOURS).contains(&hours) {
        Ok(())
    } else {
        Err(TopicError::FrequencyOutOfRange(hours))
    }
}
