//! SQLite persistence for topics, content records and collection attempts.

pub mod diesel_attempt;
pub mod diesel_content;
pub mod diesel_models;
pub mod diesel_pool;
pub mod diesel_topic;
pub mod migrations;
pub mod store;

pub use diesel_attempt::DieselAttemptRepository;
pub use diesel_content::DieselContentRepository;
pub use diesel_pool::{create_diesel_pool, run_blocking, SqlitePool};
pub use diesel_topic::DieselTopicRepository;
pub use store::{CollectionStore, DieselStore};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::TopicError;

/// Errors returned by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("collection attempt {0} is already finalized")]
    AlreadyFinalized(String),

    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        StoreError::Pool(e.to_string())
    }
}

/// Format a timestamp for storage.
///
/// Fixed-width microsecond precision keeps text ordering chronological.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, falling back to now for unreadable values.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse an optional stored timestamp.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::diesel_pool::create_diesel_pool_from_url;
    use super::migrations::run_migrations;
    use super::SqlitePool;
    use tempfile::TempDir;

    /// Fresh migrated database in a temporary directory.
    pub async fn setup_test_db() -> (SqlitePool, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = create_diesel_pool_from_url(&db_path.display().to_string()).unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_datetime_roundtrip_and_order() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::milliseconds(500);
        assert_eq!(parse_datetime(&format_datetime(a)), a);
        assert_eq!(format_datetime(a).len(), format_datetime(b).len());
        assert!(format_datetime(a) < format_datetime(b));
        assert_eq!(parse_datetime_opt(Some("garbage".to_string())), None);
        assert_eq!(parse_datetime_opt(None), None);
    }
}
