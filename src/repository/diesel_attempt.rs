//! Diesel-based collection attempt repository for SQLite.
//!
//! Attempts are append-only: a row is inserted when collection starts and
//! written exactly once more when it finishes.

use chrono::Utc;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::BigInt;

use super::diesel_models::{AttemptRecord, NewAttemptRecord};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::{format_datetime, parse_datetime, parse_datetime_opt, StoreError};
use crate::models::{
    AttemptOutcome, AttemptStatus, CollectionAttempt, CollectionCounts, NewCollectionAttempt,
    Strategy,
};
use crate::schema::collection_attempts;

impl From<AttemptRecord> for CollectionAttempt {
    fn from(record: AttemptRecord) -> Self {
        CollectionAttempt {
            id: record.id,
            topic_id: record.topic_id,
            status: AttemptStatus::from_str(&record.status).unwrap_or(AttemptStatus::Error),
            query_used: record.query_used,
            strategy: Strategy::from_str(&record.strategy).unwrap_or(Strategy::Incremental),
            counts: CollectionCounts {
                total_results: record.total_results.max(0) as u32,
                new_items: record.new_items.max(0) as u32,
                duplicate_items: record.duplicate_items.max(0) as u32,
                invalid_items: record.invalid_items.max(0) as u32,
            },
            api_calls_used: record.api_calls_used.max(0) as u32,
            started_at: parse_datetime(&record.started_at),
            completed_at: parse_datetime_opt(record.completed_at),
            error_message: record.error_message,
            error_trace: record.error_trace,
            metadata: serde_json::from_str(&record.metadata).unwrap_or_default(),
        }
    }
}

/// Diesel-based collection attempt repository.
#[derive(Clone)]
pub struct DieselAttemptRepository {
    pool: SqlitePool,
}

impl DieselAttemptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open an attempt. Status starts as `success` and `started_at` is now.
    pub async fn create(
        &self,
        attempt: &NewCollectionAttempt,
    ) -> Result<CollectionAttempt, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let started_at = format_datetime(Utc::now());
        let metadata = serde_json::to_string(&attempt.metadata)?;
        let attempt = attempt.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let record = NewAttemptRecord {
                id: &id,
                topic_id: attempt.topic_id.as_deref(),
                status: AttemptStatus::Success.as_str(),
                query_used: &attempt.query_used,
                strategy: attempt.strategy.as_str(),
                total_results: 0,
                new_items: 0,
                duplicate_items: 0,
                invalid_items: 0,
                api_calls_used: 0,
                started_at: &started_at,
                completed_at: None,
                error_message: None,
                error_trace: None,
                metadata: &metadata,
            };
            diesel::insert_into(collection_attempts::table)
                .values(&record)
                .execute(conn)?;
            let stored = collection_attempts::table
                .find(&id)
                .first::<AttemptRecord>(conn)?;
            Ok(CollectionAttempt::from(stored))
        })
        .await
    }

    /// Close an attempt with its final status and counts.
    ///
    /// Fails with `AlreadyFinalized` if the attempt was closed before.
    pub async fn finalize(
        &self,
        id: &str,
        outcome: &AttemptOutcome,
    ) -> Result<CollectionAttempt, StoreError> {
        let id = id.to_string();
        let completed_at = format_datetime(Utc::now());
        let outcome = outcome.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let current = collection_attempts::table
                    .find(&id)
                    .first::<AttemptRecord>(conn)
                    .optional()?
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "collection attempt",
                        id: id.clone(),
                    })?;
                if current.completed_at.is_some() {
                    return Err(StoreError::AlreadyFinalized(id.clone()));
                }

                let counts = outcome.counts;
                diesel::update(collection_attempts::table.find(&id))
                    .set((
                        collection_attempts::status.eq(outcome.status.as_str()),
                        collection_attempts::total_results.eq(counts.total_results as i32),
                        collection_attempts::new_items.eq(counts.new_items as i32),
                        collection_attempts::duplicate_items.eq(counts.duplicate_items as i32),
                        collection_attempts::invalid_items.eq(counts.invalid_items as i32),
                        collection_attempts::api_calls_used.eq(outcome.api_calls_used as i32),
                        collection_attempts::completed_at.eq(Some(&completed_at)),
                        collection_attempts::error_message.eq(outcome.error_message.as_deref()),
                        collection_attempts::error_trace.eq(outcome.error_trace.as_deref()),
                    ))
                    .execute(conn)?;

                let updated = collection_attempts::table
                    .find(&id)
                    .first::<AttemptRecord>(conn)?;
                Ok(CollectionAttempt::from(updated))
            })
        })
        .await
    }

    /// Most recent attempts, newest first.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<CollectionAttempt>, StoreError> {
        self.load(limit, false).await
    }

    /// Most recent failed attempts (any status but `success`), newest first.
    pub async fn list_errors(&self, limit: u32) -> Result<Vec<CollectionAttempt>, StoreError> {
        self.load(limit, true).await
    }

    async fn load(
        &self,
        limit: u32,
        errors_only: bool,
    ) -> Result<Vec<CollectionAttempt>, StoreError> {
        let limit = limit as i64;
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let mut query = collection_attempts::table.into_boxed();
            if errors_only {
                query = query.filter(collection_attempts::status.ne(AttemptStatus::Success.as_str()));
            }
            let records = query
                .order(collection_attempts::started_at.desc())
                .then_order_by(sql::<BigInt>("rowid").desc())
                .limit(limit)
                .load::<AttemptRecord>(conn)?;
            Ok(records.into_iter().map(CollectionAttempt::from).collect())
        })
        .await
    }
}
