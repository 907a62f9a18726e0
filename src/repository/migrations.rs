//! Idempotent schema setup.

use diesel::prelude::*;
use tracing::debug;

use super::diesel_pool::{run_blocking, SqlitePool};
use super::StoreError;

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS topics (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        search_query TEXT NOT NULL,
        description TEXT,
        category TEXT,
        active BOOLEAN NOT NULL DEFAULT 1,
        priority TEXT NOT NULL DEFAULT 'normal',
        check_frequency_hours INTEGER NOT NULL DEFAULT 24
            CHECK (check_frequency_hours BETWEEN 1 AND 168),
        last_checked TEXT,
        query_version INTEGER NOT NULL DEFAULT 1,
        total_posts_collected BIGINT NOT NULL DEFAULT 0,
        avg_posts_per_query DOUBLE NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_topics_active ON topics(active, priority)",
    r#"CREATE TABLE IF NOT EXISTS content_records (
        id TEXT PRIMARY KEY NOT NULL,
        topic_id TEXT REFERENCES topics(id) ON DELETE SET NULL,
        search_query TEXT NOT NULL,
        source_url TEXT NOT NULL,
        source_title TEXT NOT NULL DEFAULT '',
        source_domain TEXT NOT NULL DEFAULT '',
        source_type TEXT NOT NULL DEFAULT 'unknown',
        content TEXT NOT NULL,
        full_answer TEXT,
        metadata TEXT NOT NULL DEFAULT '{}',
        relevance_score DOUBLE NOT NULL DEFAULT 0,
        confidence_score DOUBLE NOT NULL DEFAULT 0,
        confidence_tier TEXT NOT NULL DEFAULT 'minimal',
        tags TEXT NOT NULL DEFAULT '[]',
        collected_at TEXT NOT NULL,
        soft_deleted_at TEXT
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_content_collected ON content_records(collected_at)",
    "CREATE INDEX IF NOT EXISTS idx_content_url ON content_records(source_url)",
    "CREATE INDEX IF NOT EXISTS idx_content_topic ON content_records(topic_id)",
    r#"CREATE TABLE IF NOT EXISTS collection_attempts (
        id TEXT PRIMARY KEY NOT NULL,
        topic_id TEXT REFERENCES topics(id) ON DELETE SET NULL,
        status TEXT NOT NULL,
        query_used TEXT NOT NULL,
        strategy TEXT NOT NULL,
        total_results INTEGER NOT NULL DEFAULT 0,
        new_items INTEGER NOT NULL DEFAULT 0,
        duplicate_items INTEGER NOT NULL DEFAULT 0,
        invalid_items INTEGER NOT NULL DEFAULT 0,
        api_calls_used INTEGER NOT NULL DEFAULT 0,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        error_message TEXT,
        error_trace TEXT,
        metadata TEXT NOT NULL DEFAULT '{}'
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_attempts_started ON collection_attempts(started_at)",
    "CREATE INDEX IF NOT EXISTS idx_attempts_status ON collection_attempts(status)",
];

/// Create every table and index that does not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    run_blocking(pool.clone(), |conn| {
        conn.transaction::<_, StoreError, _>(|conn| {
            for statement in STATEMENTS {
                diesel::sql_query(*statement).execute(conn)?;
            }
            Ok(())
        })
    })
    .await?;
    debug!("Database schema is up to date");
    Ok(())
}
