//! Collector backed by the Perplexity search API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::citations::parse_answer;
use super::search_client::{SearchAnswer, SearchApi, SearchError};
use super::{strategy_query, Collector};
use crate::models::{CandidateItem, Strategy, Topic};

/// Name stored as the `source` of every candidate.
pub const SOURCE_NAME: &str = "perplexity";

pub struct PerplexityCollector {
    api: Arc<dyn SearchApi>,
    initial_collection_days: u32,
}

impl PerplexityCollector {
    pub fn new(api: Arc<dyn SearchApi>, initial_collection_days: u32) -> Self {
        Self {
            api,
            initial_collection_days,
        }
    }
}

#[async_trait]
impl Collector for PerplexityCollector {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn build_query(&self, topic: &Topic, strategy: Strategy) -> String {
        strategy_query(
            &topic.search_query,
            strategy,
            topic.last_checked,
            self.initial_collection_days,
        )
    }

    fn ready(&self) -> Result<(), SearchError> {
        self.api.ready()
    }

    async fn fetch(&self, query: &str) -> Result<SearchAnswer, SearchError> {
        self.api.search(query).await
    }

    fn parse_candidates(
        &self,
        answer: &SearchAnswer,
        collected_at: DateTime<Utc>,
    ) -> Vec<CandidateItem> {
        let items = parse_answer(&answer.content, &answer.citations, SOURCE_NAME, collected_at);
        debug!("Extracted {} citations from response", items.len());
        items
    }

    async fn probe(&self) -> Result<(), SearchError> {
        self.api.probe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use std::sync::Mutex;

    struct CannedApi {
        answer: String,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SearchApi for CannedApi {
        async fn search(&self, query: &str) -> Result<SearchAnswer, SearchError> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(SearchAnswer {
                content: self.answer.clone(),
                citations: Vec::new(),
            })
        }
    }

    fn topic(last_checked: Option<DateTime<Utc>>) -> Topic {
        let now = Utc::now();
        Topic {
            id: "t1".to_string(),
            name: "Energy".to_string(),
            search_query: "grid storage".to_string(),
            description: None,
            category: None,
            active: true,
            priority: Priority::Normal,
            check_frequency_hours: 24,
            last_checked,
            query_version: 1,
            total_posts_collected: 0,
            avg_posts_per_query: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_fetch_and_parse() {
        let api = Arc::new(CannedApi {
            answer: "See [1] https://a.com and more [2] https://b.com info".to_string(),
            queries: Mutex::new(Vec::new()),
        });
        let collector = PerplexityCollector::new(api.clone(), 7);

        let t = topic(None);
        let query = collector.build_query(&t, t.next_strategy());
        assert_eq!(query, "grid storage from the last 7 days");

        let answer = collector.fetch(&query).await.unwrap();
        let items = collector.parse_candidates(&answer, Utc::now());
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.metadata.source == "perplexity"));
        assert_eq!(*api.queries.lock().unwrap(), vec![query.clone()]);
    }
}
