//! Diesel-based content record repository for SQLite.

use chrono::Utc;
use diesel::prelude::*;

use super::diesel_models::{ContentRow, NewContentRow};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::{format_datetime, parse_datetime, parse_datetime_opt, StoreError};
use crate::models::{ConfidenceTier, ContentRecord, ContentStats, NewContentRecord, SourceType};
use crate::schema::content_records;

impl From<ContentRow> for ContentRecord {
    fn from(row: ContentRow) -> Self {
        ContentRecord {
            id: row.id,
            topic_id: row.topic_id,
            search_query: row.search_query,
            source_url: row.source_url,
            source_title: row.source_title,
            source_domain: row.source_domain,
            source_type: SourceType::from_str(&row.source_type).unwrap_or(SourceType::Unknown),
            content: row.content,
            full_answer: row.full_answer,
            metadata: serde_json::from_str(&row.metadata).unwrap_or_default(),
            relevance_score: row.relevance_score,
            confidence_score: row.confidence_score,
            confidence_tier: ConfidenceTier::from_str(&row.confidence_tier)
                .unwrap_or(ConfidenceTier::Minimal),
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            collected_at: parse_datetime(&row.collected_at),
            soft_deleted_at: parse_datetime_opt(row.soft_deleted_at),
        }
    }
}

/// Diesel-based content repository.
#[derive(Clone)]
pub struct DieselContentRepository {
    pool: SqlitePool,
}

impl DieselContentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a scored record.
    pub async fn create(&self, record: &NewContentRecord) -> Result<ContentRecord, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let collected_at = format_datetime(Utc::now());
        let metadata = serde_json::to_string(&record.metadata)?;
        let tags = serde_json::to_string(&record.tags)?;
        let record = record.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let row = NewContentRow {
                id: &id,
                topic_id: record.topic_id.as_deref(),
                search_query: &record.search_query,
                source_url: &record.source_url,
                source_title: &record.source_title,
                source_domain: &record.source_domain,
                source_type: record.source_type.as_str(),
                content: &record.content,
                full_answer: record.full_answer.as_deref(),
                metadata: &metadata,
                relevance_score: record.relevance_score,
                confidence_score: record.confidence_score,
                confidence_tier: record.confidence_tier.as_str(),
                tags: &tags,
                collected_at: &collected_at,
                soft_deleted_at: None,
            };
            diesel::insert_into(content_records::table)
                .values(&row)
                .execute(conn)?;
            let stored = content_records::table
                .find(&id)
                .first::<ContentRow>(conn)?;
            Ok(ContentRecord::from(stored))
        })
        .await
    }

    /// Get a record by ID.
    pub async fn get(&self, id: &str) -> Result<Option<ContentRecord>, StoreError> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let row = content_records::table
                .find(&id)
                .first::<ContentRow>(conn)
                .optional()?;
            Ok(row.map(ContentRecord::from))
        })
        .await
    }

    /// Most recent visible records, newest first.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<ContentRecord>, StoreError> {
        let limit = limit as i64;
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows = content_records::table
                .filter(content_records::soft_deleted_at.is_null())
                .order(content_records::collected_at.desc())
                .limit(limit)
                .load::<ContentRow>(conn)?;
            Ok(rows.into_iter().map(ContentRecord::from).collect())
        })
        .await
    }

    /// URL and body of every stored record, deleted ones included.
    pub async fn known_keys(&self) -> Result<Vec<(String, String)>, StoreError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let keys = content_records::table
                .select((content_records::source_url, content_records::content))
                .load::<(String, String)>(conn)?;
            Ok(keys)
        })
        .await
    }

    /// Mark a record deleted. Returns false if it was missing or already deleted.
    pub async fn soft_delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let now = format_datetime(Utc::now());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows = diesel::update(
                content_records::table
                    .find(&id)
                    .filter(content_records::soft_deleted_at.is_null()),
            )
            .set(content_records::soft_deleted_at.eq(Some(&now)))
            .execute(conn)?;
            Ok(rows > 0)
        })
        .await
    }

    /// Aggregate numbers over visible records.
    pub async fn stats(&self) -> Result<ContentStats, StoreError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::{avg, count_distinct, count_star};

            let total: i64 = content_records::table
                .filter(content_records::soft_deleted_at.is_null())
                .select(count_star())
                .first(conn)?;
            let deleted: i64 = content_records::table
                .filter(content_records::soft_deleted_at.is_not_null())
                .select(count_star())
                .first(conn)?;
            let average_confidence: Option<f64> = content_records::table
                .filter(content_records::soft_deleted_at.is_null())
                .select(avg(content_records::confidence_score))
                .first(conn)?;
            let unique_domains: i64 = content_records::table
                .filter(content_records::soft_deleted_at.is_null())
                .select(count_distinct(content_records::source_domain))
                .first(conn)?;

            let by_source_type: Vec<GroupCount> = diesel::sql_query(
                "SELECT source_type AS label, COUNT(*) AS count FROM content_records \
                 WHERE soft_deleted_at IS NULL GROUP BY source_type ORDER BY count DESC, label",
            )
            .load(conn)?;
            let by_tier: Vec<GroupCount> = diesel::sql_query(
                "SELECT confidence_tier AS label, COUNT(*) AS count FROM content_records \
                 WHERE soft_deleted_at IS NULL GROUP BY confidence_tier ORDER BY count DESC, label",
            )
            .load(conn)?;

            Ok(ContentStats {
                total_records: total as u64,
                deleted_records: deleted as u64,
                average_confidence,
                by_source_type: by_source_type.into_iter().map(GroupCount::pair).collect(),
                by_tier: by_tier.into_iter().map(GroupCount::pair).collect(),
                unique_domains: unique_domains as u64,
            })
        })
        .await
    }
}

#[derive(diesel::QueryableByName)]
struct GroupCount {
    #[diesel(sql_type = diesel::sql_types::Text)]
    label: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

impl GroupCount {
    fn pair(self) -> (String, u64) {
        (self.label, self.count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::setup_test_db;

    fn record(url: &str, source_type: SourceType, confidence: f64) -> NewContentRecord {
        NewContentRecord {
            topic_id: None,
            search_query: "climate".to_string(),
            source_url: url.to_string(),
            source_title: "Title".to_string(),
            source_domain: url::Url::parse(url)
                .unwrap()
                .host_str()
                .unwrap()
                .to_string(),
            source_type,
            content: format!("Body text for {}", url),
            full_answer: Some("answer".to_string()),
            metadata: serde_json::json!({"citation_number": 1, "source": "perplexity"}),
            relevance_score: 0.8,
            confidence_score: confidence,
            confidence_tier: ConfidenceTier::from_score(confidence, &Default::default()),
            tags: vec!["climate".to_string(), "politics".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselContentRepository::new(pool);

        let stored = repo
            .create(&record("https://www.bbc.com/a", SourceType::News, 0.9))
            .await
            .unwrap();
        assert_eq!(stored.tags, vec!["climate", "politics"]);
        assert_eq!(stored.metadata["source"], "perplexity");
        assert_eq!(stored.confidence_tier, ConfidenceTier::High);
        assert!(stored.soft_deleted_at.is_none());

        let fetched = repo.get(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.source_url, "https://www.bbc.com/a");
        assert_eq!(fetched.source_type, SourceType::News);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_listing() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselContentRepository::new(pool);

        let a = repo
            .create(&record("https://a.example.org/1", SourceType::Unknown, 0.6))
            .await
            .unwrap();
        repo.create(&record("https://b.example.org/2", SourceType::Blog, 0.7))
            .await
            .unwrap();

        assert!(repo.soft_delete(&a.id).await.unwrap());
        assert!(!repo.soft_delete(&a.id).await.unwrap());
        assert!(!repo.soft_delete("missing").await.unwrap());

        let recent = repo.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].source_url, "https://b.example.org/2");

        // Deleted records still count as known for dedup.
        assert_eq!(repo.known_keys().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselContentRepository::new(pool);

        let empty = repo.stats().await.unwrap();
        assert_eq!(empty.total_records, 0);
        assert_eq!(empty.average_confidence, None);

        repo.create(&record("https://www.bbc.com/a", SourceType::News, 0.9))
            .await
            .unwrap();
        repo.create(&record("https://www.bbc.com/b", SourceType::News, 0.7))
            .await
            .unwrap();
        repo.create(&record("https://x.gov/c", SourceType::Government, 0.5))
            .await
            .unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.deleted_records, 0);
        assert_eq!(stats.unique_domains, 2);
        assert!((stats.average_confidence.unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(stats.by_source_type[0], ("news".to_string(), 2));
        assert_eq!(stats.by_tier.len(), 2);
    }
}
