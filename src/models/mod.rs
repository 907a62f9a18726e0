//! Domain types shared by the collectors, scheduler and repositories.

mod attempt;
mod content;
mod topic;

pub use attempt::{
    AttemptOutcome, AttemptStatus, CollectionAttempt, CollectionCounts, NewCollectionAttempt,
    Strategy,
};
pub use content::{
    CandidateItem, CandidateMetadata, ConfidenceThresholds, ConfidenceTier, ContentRecord,
    ContentStats, NewContentRecord, SourceType, MAX_TAGS,
};
pub use topic::{
    validate_check_frequency, NewTopic, Priority, Topic, TopicError, MAX_CHECK_FREQUENCY_HOURS,
    MIN_CHECK_FREQUENCY_HOURS,
};
