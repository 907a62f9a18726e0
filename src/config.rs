//! Configuration management for citewatch using the prefer crate.
//!
//! `Config` mirrors the file on disk (every field optional), `Settings` is the
//! resolved runtime view. Values are layered: defaults, then the config file,
//! then environment variables.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collectors::rate_limiter::RateLimitConfig;
use crate::collectors::search_client::SearchConfig;
use crate::collectors::validator::ValidatorConfig;
use crate::models::{validate_check_frequency, ConfidenceThresholds, Priority, TopicError};
use crate::scheduler::SchedulerConfig;

/// Environment variable holding the search API key.
pub const API_KEY_ENV: &str = "PERPLEXITY_API_KEY";

/// Errors raised for settings that cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("confidence thresholds must satisfy high >= medium >= low")]
    ThresholdOrder,

    #[error("{priority} default frequency: {source}")]
    Frequency {
        priority: Priority,
        #[source]
        source: TopicError,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{name} has an unusable value: {value}")]
    Unusable { name: &'static str, value: String },
}

/// Default check frequency for each priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityFrequencies {
    pub critical: u32,
    pub normal: u32,
    pub low: u32,
}

impl Default for PriorityFrequencies {
    fn default() -> Self {
        Self {
            critical: 6,
            normal: 24,
            low: 72,
        }
    }
}

impl PriorityFrequencies {
    pub fn for_priority(&self, priority: Priority) -> u32 {
        match priority {
            Priority::Critical => self.critical,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Bearer token for the search API.
    pub api_key: Option<String>,
    /// Timeout for a single search API call.
    pub request_timeout: Duration,
    pub search: SearchConfig,
    pub rate_limit: RateLimitConfig,
    pub validator: ValidatorConfig,
    pub confidence: ConfidenceThresholds,
    pub frequencies: PriorityFrequencies,
    pub scheduler: SchedulerConfig,
    /// Configured values that could not be applied, reported by `validate`.
    pub rejected: Vec<(&'static str, String)>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("citewatch");

        Self {
            data_dir,
            database_filename: "citewatch.db".to_string(),
            log_level: "info".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            search: SearchConfig::default(),
            rate_limit: RateLimitConfig::default(),
            validator: ValidatorConfig::default(),
            confidence: ConfidenceThresholds::default(),
            frequencies: PriorityFrequencies::default(),
            scheduler: SchedulerConfig::default(),
            rejected: Vec::new(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((name, value)) = self.rejected.first() {
            return Err(ConfigError::Unusable {
                name: *name,
                value: value.clone(),
            });
        }

        let c = &self.confidence;
        for (name, value) in [
            ("high_confidence_threshold", c.high),
            ("medium_confidence_threshold", c.medium),
            ("low_confidence_threshold", c.low),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if !(c.high >= c.medium && c.medium >= c.low) {
            return Err(ConfigError::ThresholdOrder);
        }

        for priority in Priority::ALL {
            validate_check_frequency(self.frequencies.for_priority(priority))
                .map_err(|source| ConfigError::Frequency { priority, source })?;
        }

        if self.rate_limit.max_per_minute == 0 {
            return Err(ConfigError::Zero("max_queries_per_minute"));
        }
        if self.rate_limit.max_per_day == 0 {
            return Err(ConfigError::Zero("max_queries_per_day"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Zero("request_timeout"));
        }
        if self.scheduler.max_concurrent_topics == 0 {
            return Err(ConfigError::Zero("max_concurrent_topics"));
        }
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data.
    #[serde(default)]
    pub target: Option<String>,
    /// Database filename.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Search API call timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub max_queries_per_minute: Option<u32>,
    #[serde(default)]
    pub max_queries_per_day: Option<u32>,
    /// Minimum spacing between search API calls, in seconds.
    #[serde(default)]
    pub query_delay_seconds: Option<f64>,
    #[serde(default)]
    pub min_content_length: Option<usize>,
    #[serde(default)]
    pub trusted_domains: Option<Vec<String>>,
    #[serde(default)]
    pub high_confidence_threshold: Option<f64>,
    #[serde(default)]
    pub medium_confidence_threshold: Option<f64>,
    #[serde(default)]
    pub low_confidence_threshold: Option<f64>,
    #[serde(default)]
    pub critical_priority_frequency_hours: Option<u32>,
    #[serde(default)]
    pub normal_priority_frequency_hours: Option<u32>,
    #[serde(default)]
    pub low_priority_frequency_hours: Option<u32>,
    /// Day window used by the initial strategy.
    #[serde(default)]
    pub initial_collection_days: Option<u32>,
    /// Pause between topics in milliseconds.
    #[serde(default)]
    pub topic_pause_ms: Option<u64>,
    #[serde(default)]
    pub max_concurrent_topics: Option<usize>,
    /// Seed the dedup cache from stored content at startup.
    #[serde(default)]
    pub prime_dedup_from_store: Option<bool>,
    /// Search API request shape.
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers citewatch config files in standard locations.
    pub async fn load() -> Self {
        let mut config = match prefer::load("citewatch").await {
            Ok(pref_config) => Config {
                target: pref_config.get("target").ok(),
                database: pref_config.get("database").ok(),
                log_level: pref_config.get("log_level").ok(),
                api_key: pref_config.get("api_key").ok(),
                request_timeout: pref_config.get("request_timeout").ok(),
                max_queries_per_minute: pref_config.get("max_queries_per_minute").ok(),
                max_queries_per_day: pref_config.get("max_queries_per_day").ok(),
                query_delay_seconds: pref_config.get("query_delay_seconds").ok(),
                min_content_length: pref_config.get("min_content_length").ok(),
                trusted_domains: pref_config.get("trusted_domains").ok(),
                high_confidence_threshold: pref_config.get("high_confidence_threshold").ok(),
                medium_confidence_threshold: pref_config
                    .get("medium_confidence_threshold").ok(),
                low_confidence_threshold: pref_config.get("low_confidence_threshold").ok(),
                critical_priority_frequency_hours: pref_config
                    .get("critical_priority_frequency_hours").ok(),
                normal_priority_frequency_hours: pref_config
                    .get("normal_priority_frequency_hours").ok(),
                low_priority_frequency_hours: pref_config
                    .get("low_priority_frequency_hours").ok(),
                initial_collection_days: pref_config.get("initial_collection_days").ok(),
                topic_pause_ms: pref_config.get("topic_pause_ms").ok(),
                max_concurrent_topics: pref_config.get("max_concurrent_topics").ok(),
                prime_dedup_from_store: pref_config.get("prime_dedup_from_store").ok(),
                search: search_from_file(&pref_config),
            },
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// Overlay environment variables onto the file values.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("CITEWATCH_DATA_DIR") {
            self.target = Some(dir);
        }
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log_level = Some(level);
        }
        if let Ok(domains) = std::env::var("TRUSTED_DOMAINS") {
            self.trusted_domains = Some(parse_domain_list(&domains));
        }
        override_parsed(&mut self.max_queries_per_minute, "MAX_QUERIES_PER_MINUTE");
        override_parsed(&mut self.max_queries_per_day, "MAX_QUERIES_PER_DAY");
        override_parsed(&mut self.query_delay_seconds, "QUERY_DELAY_SECONDS");
        override_parsed(&mut self.min_content_length, "MIN_CONTENT_LENGTH");
        override_parsed(&mut self.request_timeout, "REQUEST_TIMEOUT_SECONDS");
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref target) = self.target {
            let path = shellexpand::tilde(target);
            settings.data_dir = PathBuf::from(path.as_ref());
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref level) = self.log_level {
            settings.log_level = level.to_lowercase();
        }
        if let Some(ref key) = self.api_key {
            settings.api_key = Some(key.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = Duration::from_secs(timeout);
        }
        settings.search = self.search.clone();

        if let Some(max) = self.max_queries_per_minute {
            settings.rate_limit.max_per_minute = max;
        }
        if let Some(max) = self.max_queries_per_day {
            settings.rate_limit.max_per_day = max;
        }
        if let Some(delay) = self.query_delay_seconds {
            match Duration::try_from_secs_f64(delay) {
                Ok(spacing) => settings.rate_limit.min_spacing = spacing,
                Err(_) => settings
                    .rejected
                    .push(("query_delay_seconds", delay.to_string())),
            }
        }

        if let Some(len) = self.min_content_length {
            settings.validator.min_content_length = len;
        }
        if let Some(ref domains) = self.trusted_domains {
            settings.validator.trusted_domains = domains.clone();
        }

        if let Some(v) = self.high_confidence_threshold {
            settings.confidence.high = v;
        }
        if let Some(v) = self.medium_confidence_threshold {
            settings.confidence.medium = v;
        }
        if let Some(v) = self.low_confidence_threshold {
            settings.confidence.low = v;
        }

        if let Some(h) = self.critical_priority_frequency_hours {
            settings.frequencies.critical = h;
        }
        if let Some(h) = self.normal_priority_frequency_hours {
            settings.frequencies.normal = h;
        }
        if let Some(h) = self.low_priority_frequency_hours {
            settings.frequencies.low = h;
        }

        if let Some(days) = self.initial_collection_days {
            settings.scheduler.initial_collection_days = days;
        }
        if let Some(ms) = self.topic_pause_ms {
            settings.scheduler.topic_pause = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_concurrent_topics {
            settings.scheduler.max_concurrent_topics = n;
        }
        if let Some(prime) = self.prime_dedup_from_store {
            settings.scheduler.prime_dedup_from_store = prime;
        }
    }
}

/// Read the `search` table key by key so a partial table keeps the other defaults.
fn search_from_file(file: &prefer::Config) -> SearchConfig {
    let defaults = SearchConfig::default();
    SearchConfig {
        api_endpoint: file
            .get("search.api_endpoint")
            .unwrap_or(defaults.api_endpoint),
        model: file.get("search.model").unwrap_or(defaults.model),
        max_tokens: file.get("search.max_tokens").unwrap_or(defaults.max_tokens),
        temperature: file
            .get("search.temperature")
            .unwrap_or(defaults.temperature),
        top_p: file.get("search.top_p").unwrap_or(defaults.top_p),
        prompt: file.get("search.prompt").ok(),
    }
}

/// Split a comma-separated domain list.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

fn override_parsed<T: FromStr>(slot: &mut Option<T>, var: &str) {
    if let Some(value) = std::env::var(var).ok().and_then(|v| v.trim().parse().ok()) {
        *slot = Some(value);
    }
}

/// Load settings from configuration (async version).
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings
}
