//! Content collection from the AI search API.
//!
//! A [`Collector`] turns a topic into a query, makes one external call and
//! parses the answer into candidates. Candidates then go through the shared
//! [`ContentPipeline`] (validation, dedup, classification) before storage.

pub mod citations;
pub mod classifier;
pub mod dedup;
pub mod perplexity;
pub mod pipeline;
pub mod rate_limiter;
pub mod search_client;
pub mod validator;

pub use classifier::ContentClassifier;
pub use dedup::{content_hash, DedupCache, SeenIndex};
pub use perplexity::PerplexityCollector;
pub use pipeline::{ContentPipeline, InvalidReason, Verdict};
pub use rate_limiter::{CallBudget, RateLimitConfig, RateLimitStats, RateLimiter};
pub use search_client::{SearchAnswer, SearchApi, SearchClient, SearchConfig, SearchError};
pub use validator::{extract_domain, ContentValidator, ValidatorConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{CandidateItem, Strategy, Topic};

/// A source of candidate content for topics.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Short name recorded in candidate metadata.
    fn name(&self) -> &str;

    /// Query text for `topic` under `strategy`.
    fn build_query(&self, topic: &Topic, strategy: Strategy) -> String;

    /// Fails when `fetch` could not send a request at all.
    ///
    /// Checked before a rate limit slot is taken.
    fn ready(&self) -> Result<(), SearchError> {
        Ok(())
    }

    /// Make the external call. Never retried here.
    async fn fetch(&self, query: &str) -> Result<SearchAnswer, SearchError>;

    /// Extract candidates from an answer.
    fn parse_candidates(
        &self,
        answer: &SearchAnswer,
        collected_at: DateTime<Utc>,
    ) -> Vec<CandidateItem>;

    /// Check that the source is reachable and accepts our credentials.
    async fn probe(&self) -> Result<(), SearchError> {
        self.fetch("test query").await.map(|_| ())
    }
}

/// Append the strategy's time constraint to a topic query.
pub fn strategy_query(
    base_query: &str,
    strategy: Strategy,
    last_checked: Option<DateTime<Utc>>,
    initial_collection_days: u32,
) -> String {
    match strategy {
        Strategy::Initial => format!(
            "{} from the last {} days",
            base_query, initial_collection_days
        ),
        Strategy::Incremental => match last_checked {
            Some(at) => format!("{} since {}", base_query, at.format("%Y-%m-%d")),
            None => format!("{} recent news", base_query),
        },
        Strategy::GapFill => format!("{} latest updates", base_query),
    }
}
