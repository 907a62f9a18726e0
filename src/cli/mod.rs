//! Command-line interface.

mod seed;

pub use seed::sample_topics;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::collectors::{
    ContentClassifier, ContentPipeline, ContentValidator, DedupCache, PerplexityCollector,
    RateLimiter, SearchClient,
};
use crate::config::{load_settings, Settings};
use crate::models::{AttemptStatus, CollectionAttempt, NewTopic, Priority, Topic};
use crate::repository::{CollectionStore, DieselStore};
use crate::scheduler::{CycleState, Scheduler};

#[derive(Parser)]
#[command(name = "citewatch")]
#[command(about = "Watch topics and collect cited sources from an AI search API")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and database
    Init,

    /// Manage watched topics
    Topics {
        #[command(subcommand)]
        command: TopicCommands,
    },

    /// Run collection cycles
    Collect {
        /// Run a single cycle and exit
        #[arg(long, conflicts_with = "continuous")]
        once: bool,

        /// Keep running cycles until interrupted
        #[arg(long)]
        continuous: bool,

        /// Minutes between cycles in continuous mode
        #[arg(long, default_value = "60")]
        interval: u64,
    },

    /// Check system health
    Health {
        /// Make a live call to the search API
        #[arg(long)]
        probe: bool,
    },

    /// Show recent collection attempts
    Logs {
        /// Only failed attempts
        #[arg(long)]
        errors: bool,

        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show content statistics
    Stats,

    /// Inspect collected content
    Content {
        #[command(subcommand)]
        command: ContentCommands,
    },
}

#[derive(Subcommand)]
enum TopicCommands {
    /// Add a topic
    Add {
        name: String,
        query: String,

        /// critical, normal or low
        #[arg(short, long, default_value = "normal", value_parser = parse_priority)]
        priority: Priority,

        /// Hours between checks (defaults to the priority's configured frequency)
        #[arg(short, long)]
        frequency: Option<u32>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        /// Create the topic paused
        #[arg(long)]
        inactive: bool,
    },

    /// List topics
    List {
        /// Include inactive topics
        #[arg(short, long)]
        all: bool,
    },

    /// Insert the built-in sample topics
    Seed,

    /// Resume collection for a topic
    Activate { id: String },

    /// Pause collection for a topic
    Deactivate { id: String },

    /// Replace a topic's search query
    SetQuery { id: String, query: String },
}

#[derive(Subcommand)]
enum ContentCommands {
    /// Most recent records
    Recent {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Hide a record
    Delete { id: String },
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::from_str(&s.to_lowercase())
        .ok_or_else(|| format!("unknown priority '{}' (expected critical, normal or low)", s))
}

/// Parse arguments, load settings and run the requested command.
pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = load_settings().await;
    init_logging(&settings, cli.verbose);
    settings.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Topics { command } => cmd_topics(&settings, command).await,
        Commands::Collect {
            once,
            continuous,
            interval,
        } => cmd_collect(&settings, once, continuous, interval).await,
        Commands::Health { probe } => cmd_health(&settings, probe).await,
        Commands::Logs { errors, limit } => cmd_logs(&settings, errors, limit).await,
        Commands::Stats => cmd_stats(&settings).await,
        Commands::Content { command } => cmd_content(&settings, command).await,
    }
}

/// `RUST_LOG` wins, then the configured level, then `info`.
fn init_logging(settings: &Settings, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn open_store(settings: &Settings) -> Result<Arc<DieselStore>> {
    settings
        .ensure_directories()
        .with_context(|| format!("creating {}", settings.data_dir.display()))?;
    let path = settings.database_path();
    let store = DieselStore::open(&path)
        .await
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Wire the collector, limiter and pipeline into a scheduler.
pub fn build_scheduler(settings: &Settings, store: Arc<dyn CollectionStore>) -> Result<Scheduler> {
    let client = SearchClient::from_settings(settings).context("building search client")?;
    let collector = PerplexityCollector::new(
        Arc::new(client),
        settings.scheduler.initial_collection_days,
    );
    let pipeline = ContentPipeline::new(
        ContentValidator::new(&settings.validator),
        ContentClassifier::new(),
        settings.confidence,
        Arc::new(DedupCache::new()),
    );
    Ok(Scheduler::new(
        store,
        Arc::new(collector),
        Arc::new(RateLimiter::with_config(settings.rate_limit.clone())),
        pipeline,
        settings.scheduler.clone(),
    ))
}

async fn cmd_init(settings: &Settings) -> Result<ExitCode> {
    open_store(settings).await?;
    println!(
        "{} Database ready at {}",
        style("✓").green(),
        settings.database_path().display()
    );
    if settings.api_key.is_none() {
        println!(
            "{} No API key configured; set {} before collecting",
            style("!").yellow(),
            crate::config::API_KEY_ENV
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_topics(settings: &Settings, command: TopicCommands) -> Result<ExitCode> {
    let store = open_store(settings).await?;

    match command {
        TopicCommands::Add {
            name,
            query,
            priority,
            frequency,
            description,
            category,
            inactive,
        } => {
            let frequency =
                frequency.unwrap_or_else(|| settings.frequencies.for_priority(priority));
            let mut topic = NewTopic::new(name, query, priority, frequency);
            topic.description = description;
            topic.category = category;
            if inactive {
                topic = topic.inactive();
            }
            let created = store.create_topic(&topic).await?;
            println!("{} Created topic {}", style("✓").green(), created.id);
            print_topic(&created);
        }
        TopicCommands::List { all } => {
            let topics = if all {
                store.list_topics().await?
            } else {
                store.get_active_topics().await?
            };
            if topics.is_empty() {
                println!("No topics");
            }
            for topic in &topics {
                print_topic(topic);
            }
        }
        TopicCommands::Seed => {
            let existing = store.list_topics().await?;
            let samples = sample_topics(existing.iter().map(|t| t.name.as_str()));
            for topic in &samples {
                let created = store.create_topic(topic).await?;
                info!("Created topic: {}", created.name);
            }
            println!("{} Seeded {} topics", style("✓").green(), samples.len());
        }
        TopicCommands::Activate { id } => {
            store.set_topic_active(&id, true).await?;
            println!("{} Activated {}", style("✓").green(), id);
        }
        TopicCommands::Deactivate { id } => {
            store.set_topic_active(&id, false).await?;
            println!("{} Deactivated {}", style("✓").green(), id);
        }
        TopicCommands::SetQuery { id, query } => {
            let topic = store.update_topic_query(&id, &query).await?;
            println!(
                "{} Query updated (version {})",
                style("✓").green(),
                topic.query_version
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_topic(topic: &Topic) {
    let last = topic
        .last_checked
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    let state = if topic.active {
        style("active").green()
    } else {
        style("paused").dim()
    };
    println!(
        "{}  {:<28} {:<8} every {:>3}h  last {}  total {}  {}",
        style(&topic.id).dim(),
        topic.name,
        topic.priority.as_str(),
        topic.check_frequency_hours,
        last,
        topic.total_posts_collected,
        state
    );
}

async fn cmd_collect(
    settings: &Settings,
    once: bool,
    continuous: bool,
    interval_minutes: u64,
) -> Result<ExitCode> {
    if !once && !continuous {
        bail!("specify --once or --continuous");
    }
    if settings.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        bail!(
            "no API key configured; set {} before collecting",
            crate::config::API_KEY_ENV
        );
    }
    let store = open_store(settings).await?;
    let scheduler = build_scheduler(settings, store)?;

    if continuous {
        let interval = cycle_interval(interval_minutes)?;
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, stopping after the current cycle");
                let _ = tx.send(true);
            }
        });
        scheduler
            .run_continuous(interval, rx)
            .await;
        return Ok(ExitCode::SUCCESS);
    }

    let report = scheduler.run_cycle().await?;
    println!("Collection {}:", report.state().as_str());
    println!("  Topics processed: {}", report.topics_processed);
    println!("  Successful:       {}", report.successful_collections);
    println!("  Failed:           {}", report.failed_collections);
    println!("  Skipped:          {}", report.skipped_topics);
    println!("  Items collected:  {}", report.total_items_collected);
    if !report.errors.is_empty() {
        println!("{}", style("Errors encountered:").red());
        for error in &report.errors {
            println!("  - {}", error);
        }
    }
    Ok(match report.state() {
        CycleState::Completed => ExitCode::SUCCESS,
        CycleState::PartiallyFailed => ExitCode::FAILURE,
    })
}

fn cycle_interval(minutes: u64) -> Result<Duration> {
    if minutes == 0 {
        bail!("--interval must be at least one minute");
    }
    match minutes.checked_mul(60) {
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => bail!("--interval of {} minutes is too large", minutes),
    }
}

async fn cmd_health(settings: &Settings, probe: bool) -> Result<ExitCode> {
    let store = open_store(settings).await?;
    let scheduler = build_scheduler(settings, store)?;
    let health = scheduler.health(probe).await;

    let mark = |ok: bool| {
        if ok {
            style("ok").green()
        } else {
            style("FAIL").red()
        }
    };

    println!("System Health Check");
    println!("  Database:          {}", mark(health.database_ok));
    if let Some(ref e) = health.database_error {
        println!("    {}", e);
    }
    println!("  API key:           {}", mark(settings.api_key.is_some()));
    match health.api_probe {
        Some(Ok(())) => println!("  API probe:         {}", mark(true)),
        Some(Err(ref e)) => println!("  API probe:         {} ({})", mark(false), e),
        None => println!("  API probe:         skipped"),
    }
    println!("  Active topics:     {}", health.active_topics);
    println!("  Due topics:        {}", health.due_topics);
    println!("  Recent attempts:   {}", health.recent_attempts);
    println!("  Recent errors:     {}", health.recent_errors);
    if let Some(at) = health.last_attempt_at {
        println!("  Last attempt:      {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    let healthy = health.healthy() && settings.api_key.is_some();
    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_logs(settings: &Settings, errors: bool, limit: u32) -> Result<ExitCode> {
    let store = open_store(settings).await?;
    let attempts = if errors {
        store.list_error_attempts(limit).await?
    } else {
        store.list_recent_attempts(limit).await?
    };
    if attempts.is_empty() {
        println!("No collection attempts");
    }
    for attempt in &attempts {
        print_attempt(attempt);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_attempt(attempt: &CollectionAttempt) {
    let status = match attempt.status {
        AttemptStatus::Success => style(attempt.status.as_str()).green(),
        _ => style(attempt.status.as_str()).red(),
    };
    let topic = attempt
        .metadata
        .get("topic_name")
        .and_then(|v| v.as_str())
        .unwrap_or("-");
    println!(
        "{}  {:<12} {:<24} {:<11} results {} new {} dup {} invalid {}",
        attempt.started_at.format("%Y-%m-%d %H:%M:%S"),
        status,
        topic,
        attempt.strategy.as_str(),
        attempt.counts.total_results,
        attempt.counts.new_items,
        attempt.counts.duplicate_items,
        attempt.counts.invalid_items
    );
    if let Some(ref message) = attempt.error_message {
        println!("    {}", style(message).red());
    }
}

async fn cmd_stats(settings: &Settings) -> Result<ExitCode> {
    let store = open_store(settings).await?;
    let stats = store.content_stats().await?;

    println!("Content records:   {}", stats.total_records);
    println!("Deleted records:   {}", stats.deleted_records);
    println!("Unique domains:    {}", stats.unique_domains);
    match stats.average_confidence {
        Some(avg) => println!("Avg confidence:    {:.2}", avg),
        None => println!("Avg confidence:    -"),
    }
    if !stats.by_source_type.is_empty() {
        println!("By source type:");
        for (label, count) in &stats.by_source_type {
            println!("  {:<12} {}", label, count);
        }
    }
    if !stats.by_tier.is_empty() {
        println!("By confidence tier:");
        for (label, count) in &stats.by_tier {
            println!("  {:<12} {}", label, count);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_content(settings: &Settings, command: ContentCommands) -> Result<ExitCode> {
    let store = open_store(settings).await?;
    match command {
        ContentCommands::Recent { limit } => {
            for record in store.list_recent_content(limit).await? {
                println!(
                    "{}  {:.2}  {:<10} {}",
                    style(&record.id).dim(),
                    record.confidence_score,
                    record.source_type.as_str(),
                    record.source_url
                );
                println!("    {}", record.source_title);
            }
        }
        ContentCommands::Delete { id } => {
            if store.soft_delete_content(&id).await? {
                println!("{} Deleted {}", style("✓").green(), id);
            } else {
                println!("{} No visible record {}", style("!").yellow(), id);
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parser() {
        assert_eq!(parse_priority("Critical"), Ok(Priority::Critical));
        assert!(parse_priority("urgent").is_err());
    }

    #[test]
    fn test_cli_parses_collect() {
        let cli = Cli::try_parse_from(["citewatch", "-v", "collect", "--once"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Collect {
                once: true,
                continuous: false,
                interval: 60
            }
        ));
        assert!(Cli::try_parse_from(["citewatch", "collect", "--once", "--continuous"]).is_err());
    }

    #[test]
    fn test_cycle_interval_bounds() {
        assert_eq!(cycle_interval(60).unwrap(), Duration::from_secs(3600));
        assert!(cycle_interval(0).is_err());
        assert!(cycle_interval(u64::MAX).is_err());
    }

    #[tokio::test]
    async fn test_collect_refuses_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path().to_path_buf());
        let err = cmd_collect(&settings, true, false, 60).await.unwrap_err();
        assert!(err.to_string().contains(crate::config::API_KEY_ENV));
        assert!(!settings.database_path().exists());
    }
}
