// Diesel table definitions. Kept in sync by hand with
// repository::migrations; timestamps are RFC 3339 text.

diesel::table! {
    topics (id) {
        id -> Text,
        name -> Text,
        search_query -> Text,
        description -> Nullable<Text>,
        category -> Nullable<Text>,
        active -> Bool,
        priority -> Text,
        check_frequency_hours -> Integer,
        last_checked -> Nullable<Text>,
        query_version -> Integer,
        total_posts_collected -> BigInt,
        avg_posts_per_query -> Double,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    content_records (id) {
        id -> Text,
        topic_id -> Nullable<Text>,
        search_query -> Text,
        source_url -> Text,
        source_title -> Text,
        source_domain -> Text,
        source_type -> Text,
        content -> Text,
        full_answer -> Nullable<Text>,
        metadata -> Text,
        relevance_score -> Double,
        confidence_score -> Double,
        confidence_tier -> Text,
        tags -> Text,
        collected_at -> Text,
        soft_deleted_at -> Nullable<Text>,
    }
}

diesel::table! {
    collection_attempts (id) {
        id -> Text,
        topic_id -> Nullable<Text>,
        status -> Text,
        query_used -> Text,
        strategy -> Text,
        total_results -> Integer,
        new_items -> Integer,
        duplicate_items -> Integer,
        invalid_items -> Integer,
        api_calls_used -> Integer,
        started_at -> Text,
        completed_at -> Nullable<Text>,
        error_message -> Nullable<Text>,
        error_trace -> Nullable<Text>,
        metadata -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(topics, content_records, collection_attempts);
