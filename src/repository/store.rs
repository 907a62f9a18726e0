//! The storage collaborator used by the scheduler and CLI.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::diesel_pool::{create_diesel_pool, run_blocking, SqlitePool};
use super::migrations::run_migrations;
use super::{DieselAttemptRepository, DieselContentRepository, DieselTopicRepository, StoreError};
use crate::models::{
    AttemptOutcome, CollectionAttempt, ContentRecord, ContentStats, NewCollectionAttempt,
    NewContentRecord, NewTopic, Priority, Topic,
};

/// Persistent store for topics, content records and collection attempts.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn create_topic(&self, topic: &NewTopic) -> Result<Topic, StoreError>;

    /// Active topics in insertion order.
    async fn get_active_topics(&self) -> Result<Vec<Topic>, StoreError>;

    /// Active topics with the given priority.
    async fn get_topics_by_priority(&self, priority: Priority) -> Result<Vec<Topic>, StoreError>;

    async fn update_topic_last_checked(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Add collected posts to the topic totals and return the updated topic.
    async fn update_topic_metrics(
        &self,
        id: &str,
        posts_collected: u64,
    ) -> Result<Topic, StoreError>;

    async fn create_content_record(
        &self,
        record: &NewContentRecord,
    ) -> Result<ContentRecord, StoreError>;

    async fn create_collection_attempt(
        &self,
        attempt: &NewCollectionAttempt,
    ) -> Result<CollectionAttempt, StoreError>;

    /// Write the final status of an attempt. Refuses attempts already finalized.
    async fn finalize_collection_attempt(
        &self,
        id: &str,
        outcome: &AttemptOutcome,
    ) -> Result<CollectionAttempt, StoreError>;

    async fn list_recent_attempts(&self, limit: u32) -> Result<Vec<CollectionAttempt>, StoreError>;

    async fn list_error_attempts(&self, limit: u32) -> Result<Vec<CollectionAttempt>, StoreError>;

    async fn list_topics(&self) -> Result<Vec<Topic>, StoreError>;

    async fn get_topic(&self, id: &str) -> Result<Option<Topic>, StoreError>;

    async fn set_topic_active(&self, id: &str, active: bool) -> Result<(), StoreError>;

    async fn update_topic_query(&self, id: &str, query: &str) -> Result<Topic, StoreError>;

    /// `(source_url, content)` of every stored record, used to seed dedup.
    async fn known_content_keys(&self) -> Result<Vec<(String, String)>, StoreError>;

    async fn content_stats(&self) -> Result<ContentStats, StoreError>;

    async fn list_recent_content(&self, limit: u32) -> Result<Vec<ContentRecord>, StoreError>;

    async fn soft_delete_content(&self, id: &str) -> Result<bool, StoreError>;

    /// Cheap round trip proving the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// SQLite-backed [`CollectionStore`].
#[derive(Clone)]
pub struct DieselStore {
    pool: SqlitePool,
    topics: DieselTopicRepository,
    content: DieselContentRepository,
    attempts: DieselAttemptRepository,
}

impl DieselStore {
    /// Open (creating if needed) the database at `path` and bring the schema up to date.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = create_diesel_pool(path)?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running migrations first.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        run_migrations(&pool).await?;
        Ok(Self {
            topics: DieselTopicRepository::new(pool.clone()),
            content: DieselContentRepository::new(pool.clone()),
            attempts: DieselAttemptRepository::new(pool.clone()),
            pool,
        })
    }

    pub fn topics(&self) -> &DieselTopicRepository {
        &self.topics
    }

    pub fn content(&self) -> &DieselContentRepository {
        &self.content
    }

    pub fn attempts(&self) -> &DieselAttemptRepository {
        &self.attempts
    }
}

#[async_trait]
impl CollectionStore for DieselStore {
    async fn create_topic(&self, topic: &NewTopic) -> Result<Topic, StoreError> {
        self.topics.create(topic).await
    }

    async fn get_active_topics(&self) -> Result<Vec<Topic>, StoreError> {
        self.topics.list_active().await
    }

    async fn get_topics_by_priority(&self, priority: Priority) -> Result<Vec<Topic>, StoreError> {
        self.topics.list_active_by_priority(priority).await
    }

    async fn update_topic_last_checked(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.topics.update_last_checked(id, at).await
    }

    async fn update_topic_metrics(
        &self,
        id: &str,
        posts_collected: u64,
    ) -> Result<Topic, StoreError> {
        self.topics.update_metrics(id, posts_collected).await
    }

    async fn create_content_record(
        &self,
        record: &NewContentRecord,
    ) -> Result<ContentRecord, StoreError> {
        self.content.create(record).await
    }

    async fn create_collection_attempt(
        &self,
        attempt: &NewCollectionAttempt,
    ) -> Result<CollectionAttempt, StoreError> {
        self.attempts.create(attempt).await
    }

    async fn finalize_collection_attempt(
        &self,
        id: &str,
        outcome: &AttemptOutcome,
    ) -> Result<CollectionAttempt, StoreError> {
        self.attempts.finalize(id, outcome).await
    }

    async fn list_recent_attempts(&self, limit: u32) -> Result<Vec<CollectionAttempt>, StoreError> {
        self.attempts.list_recent(limit).await
    }

    async fn list_error_attempts(&self, limit: u32) -> Result<Vec<CollectionAttempt>, StoreError> {
        self.attempts.list_errors(limit).await
    }

    async fn list_topics(&self) -> Result<Vec<Topic>, StoreError> {
        self.topics.list_all().await
    }

    async fn get_topic(&self, id: &str) -> Result<Option<Topic>, StoreError> {
        self.topics.get(id).await
    }

    async fn set_topic_active(&self, id: &str, active: bool) -> Result<(), StoreError> {
        self.topics.set_active(id, active).await
    }

    async fn update_topic_query(&self, id: &str, query: &str) -> Result<Topic, StoreError> {
        self.topics.update_query(id, query).await
    }

    async fn known_content_keys(&self) -> Result<Vec<(String, String)>, StoreError> {
        self.content.known_keys().await
    }

    async fn content_stats(&self) -> Result<ContentStats, StoreError> {
        self.content.stats().await
    }

    async fn list_recent_content(&self, limit: u32) -> Result<Vec<ContentRecord>, StoreError> {
        self.content.list_recent(limit).await
    }

    async fn soft_delete_content(&self, id: &str) -> Result<bool, StoreError> {
        self.content.soft_delete(id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        run_blocking(self.pool.clone(), |conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptStatus, CollectionCounts, Strategy};

    async fn open_temp() -> (DieselStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DieselStore::open(&dir.path().join("store.db")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_open_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let first = DieselStore::open(&path).await.unwrap();
        first
            .create_topic(&NewTopic::new("Solar", "solar power", Priority::Normal, 24))
            .await
            .unwrap();
        drop(first);

        let second = DieselStore::open(&path).await.unwrap();
        second.ping().await.unwrap();
        assert_eq!(second.list_topics().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_attempt_lifecycle_through_trait() {
        let (store, _dir) = open_temp().await;
        let store: &dyn CollectionStore = &store;

        let topic = store
            .create_topic(&NewTopic::new("Wind", "wind farms", Priority::Critical, 6))
            .await
            .unwrap();
        let attempt = store
            .create_collection_attempt(&NewCollectionAttempt {
                topic_id: Some(topic.id.clone()),
                query_used: "wind farms".to_string(),
                strategy: Strategy::Initial,
                metadata: serde_json::json!({"topic_name": topic.name}),
            })
            .await
            .unwrap();

        let done = store
            .finalize_collection_attempt(
                &attempt.id,
                &AttemptOutcome::failed(AttemptStatus::Error, 1, "down", "Connection(\"down\")"),
            )
            .await
            .unwrap();
        assert_eq!(done.topic_id.as_deref(), Some(topic.id.as_str()));

        let errors = store.list_error_attempts(5).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(store
            .finalize_collection_attempt(
                &attempt.id,
                &AttemptOutcome::success(CollectionCounts::default(), 1)
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_priority_lookup_only_returns_active() {
        let (store, _dir) = open_temp().await;

        let a = store
            .create_topic(&NewTopic::new("A", "a", Priority::Low, 72))
            .await
            .unwrap();
        store
            .create_topic(&NewTopic::new("B", "b", Priority::Low, 72))
            .await
            .unwrap();
        store.set_topic_active(&a.id, false).await.unwrap();

        let low = store.get_topics_by_priority(Priority::Low).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "B");
        assert!(store
            .get_topics_by_priority(Priority::Critical)
            .await
            .unwrap()
            .is_empty());
    }
}
