//! Diesel-based topic repository for SQLite.
//!
//! Selection order for due topics is insertion order, so every list query
//! sorts by creation time with `rowid` as the tie-break.

use chrono::{DateTime, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::BigInt;

use super::diesel_models::{NewTopicRecord, TopicRecord};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::{format_datetime, parse_datetime, parse_datetime_opt, StoreError};
use crate::models::{NewTopic, Priority, Topic, TopicError};
use crate::schema::topics;

/// Convert a database record to a domain model.
impl From<TopicRecord> for Topic {
    fn from(record: TopicRecord) -> Self {
        Topic {
            id: record.id,
            name: record.name,
            search_query: record.search_query,
            description: record.description,
            category: record.category,
            active: record.active,
            priority: Priority::from_str(&record.priority).unwrap_or(Priority::Normal),
            check_frequency_hours: record.check_frequency_hours.max(0) as u32,
            last_checked: parse_datetime_opt(record.last_checked),
            query_version: record.query_version.max(0) as u32,
            total_posts_collected: record.total_posts_collected.max(0) as u64,
            avg_posts_per_query: record.avg_posts_per_query,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound {
        entity: "topic",
        id: id.to_string(),
    }
}

/// Diesel-based topic repository.
#[derive(Clone)]
pub struct DieselTopicRepository {
    pool: SqlitePool,
}

impl DieselTopicRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a validated topic.
    pub async fn create(&self, topic: &NewTopic) -> Result<Topic, StoreError> {
        topic.validate()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = format_datetime(Utc::now());
        let topic = topic.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let record = NewTopicRecord {
                id: &id,
                name: topic.name.trim(),
                search_query: topic.search_query.trim(),
                description: topic.description.as_deref(),
                category: topic.category.as_deref(),
                active: topic.active,
                priority: topic.priority.as_str(),
                check_frequency_hours: topic.check_frequency_hours as i32,
                last_checked: None,
                query_version: 1,
                total_posts_collected: 0,
                avg_posts_per_query: 0.0,
                created_at: &now,
                updated_at: &now,
            };
            diesel::insert_into(topics::table)
                .values(&record)
                .execute(conn)?;
            let stored = topics::table.find(&id).first::<TopicRecord>(conn)?;
            Ok(Topic::from(stored))
        })
        .await
    }

    /// Get a topic by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Topic>, StoreError> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let record = topics::table
                .find(&id)
                .first::<TopicRecord>(conn)
                .optional()?;
            Ok(record.map(Topic::from))
        })
        .await
    }

    /// All topics, in insertion order.
    pub async fn list_all(&self) -> Result<Vec<Topic>, StoreError> {
        self.load(None, None).await
    }

    /// Active topics, in insertion order.
    pub async fn list_active(&self) -> Result<Vec<Topic>, StoreError> {
        self.load(Some(true), None).await
    }

    /// Active topics with the given priority.
    pub async fn list_active_by_priority(
        &self,
        priority: Priority,
    ) -> Result<Vec<Topic>, StoreError> {
        self.load(Some(true), Some(priority)).await
    }

    async fn load(
        &self,
        active: Option<bool>,
        priority: Option<Priority>,
    ) -> Result<Vec<Topic>, StoreError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let mut query = topics::table.into_boxed();
            if let Some(active) = active {
                query = query.filter(topics::active.eq(active));
            }
            if let Some(priority) = priority {
                query = query.filter(topics::priority.eq(priority.as_str()));
            }
            let records = query
                .order(topics::created_at.asc())
                .then_order_by(sql::<BigInt>("rowid").asc())
                .load::<TopicRecord>(conn)?;
            Ok(records.into_iter().map(Topic::from).collect())
        })
        .await
    }

    /// Count active topics.
    pub async fn count_active(&self) -> Result<u64, StoreError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = topics::table
                .filter(topics::active.eq(true))
                .select(count_star())
                .first(conn)?;
            Ok(count as u64)
        })
        .await
    }

    /// Record when a topic was last collected.
    pub async fn update_last_checked(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let id = id.to_string();
        let ts = format_datetime(at);
        let now = format_datetime(Utc::now());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows = diesel::update(topics::table.find(&id))
                .set((
                    topics::last_checked.eq(Some(&ts)),
                    topics::updated_at.eq(&now),
                ))
                .execute(conn)?;
            if rows == 0 {
                return Err(not_found(&id));
            }
            Ok(())
        })
        .await
    }

    /// Add `posts_collected` to the running total and recompute the average.
    ///
    /// The average divides by the query version (at least 1), so it measures
    /// yield per revision of the query rather than per run.
    pub async fn update_metrics(
        &self,
        id: &str,
        posts_collected: u64,
    ) -> Result<Topic, StoreError> {
        let id = id.to_string();
        let now = format_datetime(Utc::now());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let record = topics::table
                    .find(&id)
                    .first::<TopicRecord>(conn)
                    .optional()?
                    .ok_or_else(|| not_found(&id))?;

                let total = record.total_posts_collected + posts_collected as i64;
                let average = total as f64 / record.query_version.max(1) as f64;

                diesel::update(topics::table.find(&id))
                    .set((
                        topics::total_posts_collected.eq(total),
                        topics::avg_posts_per_query.eq(average),
                        topics::updated_at.eq(&now),
                    ))
                    .execute(conn)?;

                let updated = topics::table.find(&id).first::<TopicRecord>(conn)?;
                Ok(Topic::from(updated))
            })
        })
        .await
    }

    /// Activate or deactivate a topic.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError> {
        let id = id.to_string();
        let now = format_datetime(Utc::now());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows = diesel::update(topics::table.find(&id))
                .set((topics::active.eq(active), topics::updated_at.eq(&now)))
                .execute(conn)?;
            if rows == 0 {
                return Err(not_found(&id));
            }
            Ok(())
        })
        .await
    }

    /// Replace the search query and bump the query version.
    pub async fn update_query(&self, id: &str, query: &str) -> Result<Topic, StoreError> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(TopicError::EmptyQuery.into());
        }
        let id = id.to_string();
        let now = format_datetime(Utc::now());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let rows = diesel::update(topics::table.find(&id))
                    .set((
                        topics::search_query.eq(&query),
                        topics::query_version.eq(topics::query_version + 1),
                        topics::updated_at.eq(&now),
                    ))
                    .execute(conn)?;
                if rows == 0 {
                    return Err(not_found(&id));
                }
                let updated = topics::table.find(&id).first::<TopicRecord>(conn)?;
                Ok(Topic::from(updated))
            })
        })
        .await
    }
}
