//! Diesel ORM models for database tables.
//!
//! Row structs mirror `schema` column for column. Conversion to domain types
//! lives next to each repository.

use diesel::prelude::*;

use crate::schema;

/// Topic record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::topics)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TopicRecord {
    pub id: String,
    pub name: String,
    pub search_query: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub active: bool,
    pub priority: String,
    pub check_frequency_hours: i32,
    pub last_checked: Option<String>,
    pub query_version: i32,
    pub total_posts_collected: i64,
    pub avg_posts_per_query: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// New topic for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::topics)]
pub struct NewTopicRecord<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub search_query: &'a str,
    pub description: Option<&'a str>,
    pub category: Option<&'a str>,
    pub active: bool,
    pub priority: &'a str,
    pub check_frequency_hours: i32,
    pub last_checked: Option<&'a str>,
    pub query_version: i32,
    pub total_posts_collected: i64,
    pub avg_posts_per_query: f64,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Content record row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::content_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ContentRow {
    pub id: String,
    pub topic_id: Option<String>,
    pub search_query: String,
    pub source_url: String,
    pub source_title: String,
    pub source_domain: String,
    pub source_type: String,
    pub content: String,
    pub full_answer: Option<String>,
    pub metadata: String,
    pub relevance_score: f64,
    pub confidence_score: f64,
    pub confidence_tier: String,
    pub tags: String,
    pub collected_at: String,
    pub soft_deleted_at: Option<String>,
}

/// New content record for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::content_records)]
pub struct NewContentRow<'a> {
    pub id: &'a str,
    pub topic_id: Option<&'a str>,
    pub search_query: &'a str,
    pub source_url: &'a str,
    pub source_title: &'a str,
    pub source_domain: &'a str,
    pub source_type: &'a str,
    pub content: &'a str,
    pub full_answer: Option<&'a str>,
    pub metadata: &'a str,
    pub relevance_score: f64,
    pub confidence_score: f64,
    pub confidence_tier: &'a str,
    pub tags: &'a str,
    pub collected_at: &'a str,
    pub soft_deleted_at: Option<&'a str>,
}

/// Collection attempt row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::collection_attempts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AttemptRecord {
    pub id: String,
    pub topic_id: Option<String>,
    pub status: String,
    pub query_used: String,
    pub strategy: String,
    pub total_results: i32,
    pub new_items: i32,
    pub duplicate_items: i32,
    pub invalid_items: i32,
    pub api_calls_used: i32,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub error_trace: Option<String>,
    pub metadata: String,
}

/// New collection attempt for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::collection_attempts)]
pub struct NewAttemptRecord<'a> {
    pub id: &'a str,
    pub topic_id: Option<&'a str>,
    pub status: &'a str,
    pub query_used: &'a str,
    pub strategy: &'a str,
    pub total_results: i32,
    pub new_items: i32,
    pub duplicate_items: i32,
    pub invalid_items: i32,
    pub api_calls_used: i32,
    pub started_at: &'a str,
    pub completed_at: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub error_trace: Option<&'a str>,
    pub metadata: &'a str,
}
