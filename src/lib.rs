//! citewatch: watches topics through an AI search API and keeps the cited sources.
//!
//! A [`scheduler::Scheduler`] picks the topics that are due, asks a
//! [`collectors::Collector`] for an answer, and runs every citation through
//! validation, deduplication and scoring before it lands in SQLite.

pub mod cli;
pub mod collectors;
pub mod config;
pub mod models;
pub mod repository;
pub mod schema;
pub mod scheduler;
