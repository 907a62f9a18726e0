//! Priority scheduler driving collection cycles.
//!
//! A cycle selects the active topics that are due, orders them by priority
//! and runs one collection per topic:
//!
//! 1. skip the topic if the rate limiter has no room (nothing is recorded)
//! 2. open a collection attempt
//! 3. check the collector can send a request, wait for a call slot, call
//!    the collector and parse the answer
//! 4. run every candidate through the content pipeline and store survivors
//! 5. on success, update the topic's last-checked time and totals
//! 6. finalize the attempt with counts, or with the error
//!
//! A failing topic never aborts the cycle. Only a store failure while
//! selecting topics is returned to the caller.

mod report;

pub use report::{CycleReport, CycleState, HealthSnapshot, TopicOutcome};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error, info, warn};

use crate::collectors::{CallBudget, Collector, ContentPipeline, SearchError, Verdict};
use crate::models::{
    AttemptOutcome, AttemptStatus, CollectionCounts, NewCollectionAttempt, Topic,
};
use crate::repository::{CollectionStore, StoreError};

/// Tuning for the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Day window asked for by the initial strategy.
    pub initial_collection_days: u32,
    /// Pause between two topics in sequential mode.
    pub topic_pause: Duration,
    /// Topics collected at once. 1 means strictly sequential.
    pub max_concurrent_topics: usize,
    /// Seed the dedup index from stored content before the first cycle.
    pub prime_dedup_from_store: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_collection_days: 7,
            topic_pause: Duration::from_millis(1000),
            max_concurrent_topics: 1,
            prime_dedup_from_store: true,
        }
    }
}

/// Errors that abort a whole cycle.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Why a single topic's collection failed.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("rate limit reached before the call could start")]
    BudgetExhausted,

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CollectError {
    fn attempt_status(&self) -> AttemptStatus {
        match self {
            Self::BudgetExhausted => AttemptStatus::RateLimited,
            Self::Search(e) => e.attempt_status(),
            Self::Store(_) => AttemptStatus::Error,
        }
    }

    fn api_calls_used(&self) -> u32 {
        match self {
            Self::BudgetExhausted => 0,
            Self::Search(e) if !e.reached_api() => 0,
            _ => 1,
        }
    }
}

/// Stable sort by priority rank; equal priorities keep their order.
pub fn order_by_priority(topics: &mut [Topic]) {
    topics.sort_by_key(|t| t.priority.rank());
}

/// Runs collection cycles over the stored topics.
pub struct Scheduler {
    store: Arc<dyn CollectionStore>,
    collector: Arc<dyn Collector>,
    budget: Arc<dyn CallBudget>,
    pipeline: ContentPipeline,
    config: SchedulerConfig,
    primed: OnceCell<usize>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        collector: Arc<dyn Collector>,
        budget: Arc<dyn CallBudget>,
        pipeline: ContentPipeline,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            collector,
            budget,
            pipeline,
            config,
            primed: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Load stored URLs and bodies into the dedup index, once per scheduler.
    pub async fn prime_dedup(&self) -> Result<usize, StoreError> {
        let count = self
            .primed
            .get_or_try_init(|| async {
                let keys = self.store.known_content_keys().await?;
                let count = self.pipeline.mark_known(keys);
                info!("Primed dedup index with {} stored records", count);
                Ok::<_, StoreError>(count)
            })
            .await?;
        Ok(*count)
    }

    /// Active topics due at `now`, in processing order.
    pub async fn due_topics(&self, now: DateTime<Utc>) -> Result<Vec<Topic>, StoreError> {
        let mut topics: Vec<Topic> = self
            .store
            .get_active_topics()
            .await?
            .into_iter()
            .filter(|t| t.is_due(now))
            .collect();
        order_by_priority(&mut topics);
        Ok(topics)
    }

    /// Run one cycle over every due topic.
    pub async fn run_cycle(&self) -> Result<CycleReport, SchedulerError> {
        let started_at = Utc::now();
        if self.config.prime_dedup_from_store {
            self.prime_dedup().await?;
        }

        let due = self.due_topics(started_at).await?;
        info!("Starting collection cycle: {} topics due", due.len());

        let mut report = CycleReport::new(started_at);
        if self.config.max_concurrent_topics <= 1 {
            let last = due.len().saturating_sub(1);
            for (i, topic) in due.iter().enumerate() {
                let outcome = self.collect_topic(topic).await;
                report.record(&topic.name, &outcome);
                if i < last && !self.config.topic_pause.is_zero() {
                    tokio::time::sleep(self.config.topic_pause).await;
                }
            }
        } else {
            let outcomes: Vec<(Topic, TopicOutcome)> = stream::iter(due)
                .map(|topic| async move {
                    let outcome = self.collect_topic(&topic).await;
                    (topic, outcome)
                })
                .buffered(self.config.max_concurrent_topics)
                .collect()
                .await;
            for (topic, outcome) in &outcomes {
                report.record(&topic.name, outcome);
            }
        }
        report.finish(Utc::now());

        info!(
            "Collection cycle {}: {} processed, {} succeeded, {} failed, {} skipped, {} new items",
            report.state().as_str(),
            report.topics_processed,
            report.successful_collections,
            report.failed_collections,
            report.skipped_topics,
            report.total_items_collected
        );
        Ok(report)
    }

    /// Collect a single topic and record the attempt.
    pub async fn collect_topic(&self, topic: &Topic) -> TopicOutcome {
        if !self.budget.can_proceed().await {
            warn!("Rate limit reached, skipping topic: {}", topic.name);
            return TopicOutcome::Skipped;
        }

        let strategy = topic.next_strategy();
        let query = self.collector.build_query(topic, strategy);
        info!(
            "Collecting topic '{}' ({} strategy): {}",
            topic.name, strategy, query
        );

        let attempt = match self
            .store
            .create_collection_attempt(&NewCollectionAttempt {
                topic_id: Some(topic.id.clone()),
                query_used: query.clone(),
                strategy,
                metadata: json!({ "topic_name": topic.name }),
            })
            .await
        {
            Ok(attempt) => attempt,
            Err(e) => {
                error!("Could not open attempt for topic '{}': {}", topic.name, e);
                return TopicOutcome::Failed {
                    attempt_id: None,
                    error: e.to_string(),
                };
            }
        };

        let result = self.execute(topic, &query).await;
        let outcome = match &result {
            Ok(counts) => AttemptOutcome::success(*counts, 1),
            Err(e) => {
                error!(
                    "Collection failed for topic '{}' (query: {}): {}",
                    topic.name, query, e
                );
                AttemptOutcome::failed(
                    e.attempt_status(),
                    e.api_calls_used(),
                    e.to_string(),
                    format!("{:?}", e),
                )
            }
        };

        if let Err(e) = self
            .store
            .finalize_collection_attempt(&attempt.id, &outcome)
            .await
        {
            error!("Could not finalize attempt {}: {}", attempt.id, e);
        }

        match result {
            Ok(counts) => TopicOutcome::Collected {
                attempt_id: attempt.id,
                counts,
            },
            Err(e) => TopicOutcome::Failed {
                attempt_id: Some(attempt.id),
                error: e.to_string(),
            },
        }
    }

    async fn execute(&self, topic: &Topic, query: &str) -> Result<CollectionCounts, CollectError> {
        self.collector.ready()?;
        if !self.budget.acquire().await {
            return Err(CollectError::BudgetExhausted);
        }

        let answer = self.collector.fetch(query).await?;
        let candidates = self.collector.parse_candidates(&answer, Utc::now());

        let mut counts = CollectionCounts {
            total_results: candidates.len() as u32,
            ..Default::default()
        };
        for candidate in &candidates {
            match self
                .pipeline
                .evaluate(candidate, Some(&topic.id), &topic.search_query)
            {
                Verdict::Accepted(record) => {
                    match self.store.create_content_record(&record).await {
                        Ok(_) => counts.new_items += 1,
                        Err(e) => {
                            warn!("Failed to store {}: {}", record.source_url, e);
                            self.pipeline.release(&record);
                            counts.invalid_items += 1;
                        }
                    }
                }
                Verdict::Duplicate => counts.duplicate_items += 1,
                Verdict::Invalid(reason) => {
                    debug!("Rejected {} ({})", candidate.url, reason.as_str());
                    counts.invalid_items += 1;
                }
            }
        }

        self.store
            .update_topic_last_checked(&topic.id, Utc::now())
            .await?;
        let updated = self
            .store
            .update_topic_metrics(&topic.id, u64::from(counts.new_items))
            .await?;

        info!(
            "Topic '{}': {} results, {} new, {} duplicate, {} invalid (avg {:.1} per query)",
            topic.name,
            counts.total_results,
            counts.new_items,
            counts.duplicate_items,
            counts.invalid_items,
            updated.avg_posts_per_query
        );
        Ok(counts)
    }

    /// Run cycles every `interval` until `shutdown` turns true.
    ///
    /// A running cycle always finishes before the loop looks at `shutdown`.
    /// Returns the number of cycles run.
    pub async fn run_continuous(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        info!(
            "Starting continuous collection every {:.0} seconds",
            interval.as_secs_f64()
        );
        let mut cycles = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_cycle().await {
                Ok(report) => debug!("Cycle {} took {}", cycles + 1, report.duration()),
                Err(e) => error!("Collection cycle aborted: {}", e),
            }
            cycles += 1;

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Continuous collection stopped after {} cycles", cycles);
        cycles
    }

    /// Gather a health snapshot. `probe` makes one live call to the collector.
    pub async fn health(&self, probe: bool) -> HealthSnapshot {
        let now = Utc::now();
        let mut snapshot = HealthSnapshot {
            checked_at: now,
            database_ok: true,
            database_error: None,
            api_probe: None,
            active_topics: 0,
            due_topics: 0,
            recent_attempts: 0,
            recent_errors: 0,
            last_attempt_at: None,
        };

        if let Err(e) = self.fill_store_health(&mut snapshot, now).await {
            snapshot.database_ok = false;
            snapshot.database_error = Some(e.to_string());
        }

        if probe {
            snapshot.api_probe = Some(self.collector.probe().await.map_err(|e| e.to_string()));
        }
        snapshot
    }

    async fn fill_store_health(
        &self,
        snapshot: &mut HealthSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store.ping().await?;
        let active = self.store.get_active_topics().await?;
        snapshot.active_topics = active.len();
        snapshot.due_topics = active.iter().filter(|t| t.is_due(now)).count();

        let recent = self.store.list_recent_attempts(10).await?;
        snapshot.recent_attempts = recent.len();
        snapshot.last_attempt_at = recent.first().map(|a| a.started_at);
        snapshot.recent_errors = self.store.list_error_attempts(10).await?.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{
        ContentClassifier, ContentValidator, DedupCache, SearchAnswer,
    };
    use crate::models::{CandidateItem, CandidateMetadata, ConfidenceThresholds, Priority, Strategy};
    use crate::repository::DieselStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const BODY: &str = "Offshore wind capacity doubled this year as new turbines came online in the North Sea.";

    struct FixedCollector {
        fail: bool,
        queries: Mutex<Vec<String>>,
    }

    impl FixedCollector {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Collector for FixedCollector {
        fn name(&self) -> &str {
            "fixed"
        }

        fn build_query(&self, topic: &Topic, strategy: Strategy) -> String {
            format!("{} [{}]", topic.search_query, strategy)
        }

        async fn fetch(&self, query: &str) -> Result<SearchAnswer, SearchError> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(SearchError::RateLimited);
            }
            Ok(SearchAnswer {
                content: query.to_string(),
                citations: Vec::new(),
            })
        }

        fn parse_candidates(
            &self,
            answer: &SearchAnswer,
            collected_at: DateTime<Utc>,
        ) -> Vec<CandidateItem> {
            vec![CandidateItem {
                url: "https://www.reuters.com/wind".to_string(),
                title: "Wind".to_string(),
                snippet: BODY.to_string(),
                full_answer: answer.content.clone(),
                metadata: CandidateMetadata {
                    citation_number: 1,
                    source: "fixed".to_string(),
                    collected_at,
                },
            }]
        }
    }

    struct Budget {
        open: bool,
    }

    #[async_trait]
    impl CallBudget for Budget {
        async fn can_proceed(&self) -> bool {
            self.open
        }

        async fn acquire(&self) -> bool {
            self.open
        }
    }

    async fn scheduler(
        collector: Arc<FixedCollector>,
        open: bool,
    ) -> (Scheduler, Arc<DieselStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DieselStore::open(&dir.path().join("s.db")).await.unwrap());
        let pipeline = ContentPipeline::new(
            ContentValidator::default(),
            ContentClassifier::new(),
            ConfidenceThresholds::default(),
            Arc::new(DedupCache::new()),
        );
        let config = SchedulerConfig {
            topic_pause: Duration::ZERO,
            ..Default::default()
        };
        let scheduler = Scheduler::new(
            store.clone(),
            collector,
            Arc::new(Budget { open }),
            pipeline,
            config,
        );
        (scheduler, store, dir)
    }

    fn topic_with(priority: Priority, name: &str) -> Topic {
        let now = Utc::now();
        Topic {
            id: name.to_lowercase(),
            name: name.to_string(),
            search_query: name.to_lowercase(),
            description: None,
            category: None,
            active: true,
            priority,
            check_frequency_hours: 24,
            last_checked: None,
            query_version: 1,
            total_posts_collected: 0,
            avg_posts_per_query: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_order_by_priority_is_stable() {
        let mut topics = vec![
            topic_with(Priority::Low, "A"),
            topic_with(Priority::Critical, "B"),
            topic_with(Priority::Normal, "C"),
            topic_with(Priority::Critical, "D"),
        ];
        order_by_priority(&mut topics);
        let names: Vec<&str> = topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["B", "D", "C", "A"]);
    }

    #[tokio::test]
    async fn test_collect_topic_success_updates_bookkeeping() {
        let collector = Arc::new(FixedCollector::new(false));
        let (scheduler, store, _dir) = scheduler(collector.clone(), true).await;
        let topic = store
            .create_topic(&crate::models::NewTopic::new(
                "Wind",
                "offshore wind",
                Priority::Normal,
                24,
            ))
            .await
            .unwrap();

        let outcome = scheduler.collect_topic(&topic).await;
        let TopicOutcome::Collected { counts, .. } = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(counts.total_results, 1);
        assert_eq!(counts.new_items, 1);
        assert_eq!(
            *collector.queries.lock().unwrap(),
            vec!["offshore wind [initial]".to_string()]
        );

        let updated = store.get_topic(&topic.id).await.unwrap().unwrap();
        assert!(updated.last_checked.is_some());
        assert_eq!(updated.total_posts_collected, 1);
        assert_eq!(updated.avg_posts_per_query, 1.0);

        let attempts = store.list_recent_attempts(5).await.unwrap();
        assert_eq!(attempts[0].status, AttemptStatus::Success);
        assert_eq!(attempts[0].query_used, "offshore wind [initial]");
        assert_eq!(attempts[0].metadata["topic_name"], "Wind");
        assert!(attempts[0].is_finalized());

        // Same candidate again is a duplicate.
        let again = scheduler.collect_topic(&updated).await;
        let TopicOutcome::Collected { counts, .. } = again else {
            panic!("expected success");
        };
        assert_eq!(counts.duplicate_items, 1);
        assert_eq!(counts.new_items, 0);
    }

    #[tokio::test]
    async fn test_api_rate_limit_marks_attempt() {
        let collector = Arc::new(FixedCollector::new(true));
        let (scheduler, store, _dir) = scheduler(collector, true).await;
        let topic = store
            .create_topic(&crate::models::NewTopic::new("Wind", "wind", Priority::Low, 24))
            .await
            .unwrap();

        let outcome = scheduler.collect_topic(&topic).await;
        assert!(matches!(outcome, TopicOutcome::Failed { attempt_id: Some(_), .. }));

        let errors = store.list_error_attempts(5).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].status, AttemptStatus::RateLimited);
        assert_eq!(errors[0].error_trace.as_deref(), Some("Search(RateLimited)"));

        // Failed topics stay due.
        let unchanged = store.get_topic(&topic.id).await.unwrap().unwrap();
        assert!(unchanged.last_checked.is_none());
    }

    #[tokio::test]
    async fn test_closed_budget_skips_without_record() {
        let collector = Arc::new(FixedCollector::new(false));
        let (scheduler, store, _dir) = scheduler(collector.clone(), false).await;
        store
            .create_topic(&crate::models::NewTopic::new("Wind", "wind", Priority::Low, 24))
            .await
            .unwrap();

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.skipped_topics, 1);
        assert_eq!(report.topics_processed, 0);
        assert!(store.list_recent_attempts(5).await.unwrap().is_empty());
        assert!(collector.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_continuous_stops_on_shutdown() {
        let collector = Arc::new(FixedCollector::new(false));
        let (scheduler, _store, _dir) = scheduler(collector, true).await;
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        });
        let cycles = scheduler
            .run_continuous(Duration::from_secs(3600), rx)
            .await;
        stopper.await.unwrap();
        assert_eq!(cycles, 1);
    }

    #[tokio::test]
    async fn test_health_snapshot() {
        let collector = Arc::new(FixedCollector::new(true));
        let (scheduler, store, _dir) = scheduler(collector, true).await;
        store
            .create_topic(&crate::models::NewTopic::new("Wind", "wind", Priority::Low, 24))
            .await
            .unwrap();
        scheduler.run_cycle().await.unwrap();

        let health = scheduler.health(true).await;
        assert!(health.database_ok);
        assert_eq!(health.active_topics, 1);
        assert_eq!(health.due_topics, 1);
        assert_eq!(health.recent_attempts, 1);
        assert_eq!(health.recent_errors, 1);
        assert!(health.last_attempt_at.is_some());
        assert!(matches!(health.api_probe, Some(Err(_))));
        assert!(!health.healthy());
    }
}
