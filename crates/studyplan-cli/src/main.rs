use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Weekday};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::StudyplanConfig;
use studyplan_core::{
    ClaudeAdapter, ExecutorConfig, GeminiAdapter, ModelProvider, OpenAiAdapter, SchedulingRequest,
    SessionScheduler, TimeOfDay, should_use_agent_mode,
};
use studyplan_store::EventStore;

#[derive(Parser)]
#[command(name = "studyplan")]
#[command(version)]
#[command(about = "Studyplan — LLM-driven study session scheduling")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// Schedule study sessions for a student
    Schedule {
        /// Student identifier
        #[arg(long)]
        student: String,

        /// Subject to schedule
        #[arg(long)]
        subject: String,

        /// Grade level
        #[arg(long)]
        grade: String,

        /// First date of the scheduling range (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last date of the scheduling range, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// Number of sessions to place
        #[arg(long, default_value_t = 1)]
        sessions: u32,

        /// Session length in minutes
        #[arg(long, default_value_t = 60)]
        duration: u32,

        /// Comma-separated chapters, in teaching order
        #[arg(long, value_delimiter = ',')]
        chapters: Vec<String>,

        /// Preferred weekdays (e.g. mon,wed,fri)
        #[arg(long, value_delimiter = ',')]
        days: Vec<Weekday>,

        /// Preferred times of day (morning, afternoon, evening)
        #[arg(long, value_delimiter = ',')]
        times: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Schedule {
            student,
            subject,
            grade,
            from,
            to,
            sessions,
            duration,
            chapters,
            days,
            times,
        } => {
            let request = SchedulingRequest {
                student_id: student,
                subject,
                grade,
                range_start: from,
                range_end: to,
                preferred_days: days,
                preferred_times: parse_times(&times)?,
                chapters,
                target_session_count: sessions,
                session_duration_minutes: duration,
            };
            cmd_schedule(&cli.config, request).await
        }
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("Studyplan initialized at {}", config_dir.display());
    println!(
        "Edit {} to configure your API keys and provider.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = StudyplanConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_schedule(config_path: &Option<PathBuf>, request: SchedulingRequest) -> Result<()> {
    let cfg = StudyplanConfig::load(config_path)?;

    let db_path = config::expand_path(&cfg.store.db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(EventStore::new(&db_path)?);

    let existing = store
        .count_sessions(&request.student_id, request.range_start, request.range_end)
        .await?;
    if should_use_agent_mode(existing, cfg.agent.agent_mode_threshold) {
        info!(
            "{} existing event(s) in range (threshold {}): using the incremental agent loop",
            existing, cfg.agent.agent_mode_threshold
        );
    } else {
        info!(
            "{} existing event(s) in range, below threshold {}; a single bulk prompt would \
             also work, continuing with the agent loop",
            existing, cfg.agent.agent_mode_threshold
        );
    }

    let provider = build_provider(&cfg)?;
    info!(
        "Provider: {}/{}",
        provider.provider_name(),
        provider.model()
    );

    let scheduler = SessionScheduler::new(provider, store)
        .with_pricing(cfg.pricing_table())
        .with_config(ExecutorConfig {
            max_iterations: cfg.agent.max_iterations,
            ..ExecutorConfig::default()
        });

    // Ctrl+C stops between turns; sessions already committed survive
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current turn");
            cancel_on_signal.cancel();
        }
    });

    let outcome = scheduler.run(&request, &cancel).await?;

    if outcome.scheduled_sessions.is_empty() {
        println!("No sessions were scheduled.");
    } else {
        println!("Scheduled {} session(s):", outcome.scheduled_sessions.len());
        for s in &outcome.scheduled_sessions {
            println!(
                "  {} {}-{}  {} — {}",
                s.date,
                s.start_time.format("%H:%M"),
                s.end_time.format("%H:%M"),
                s.subject,
                s.chapter
            );
        }
    }
    if !outcome.completed {
        println!(
            "Run ended before reaching the target of {} session(s).",
            request.target_session_count
        );
    }
    println!(
        "{} turn(s), {} tokens ({} cost-adjusted), ${:.4}",
        outcome.reasoning_steps,
        outcome.token_usage.total_tokens,
        outcome.token_usage.cost_adjusted_tokens,
        outcome.cost_usd
    );

    Ok(())
}

fn build_provider(cfg: &StudyplanConfig) -> Result<Arc<dyn ModelProvider>> {
    match cfg.agent.provider.as_str() {
        "anthropic" => {
            let p = cfg
                .providers
                .anthropic
                .as_ref()
                .context("provider is 'anthropic' but [providers.anthropic] is missing")?;
            Ok(Arc::new(ClaudeAdapter::new(
                config::expand_str(&p.api_key),
                p.model.clone(),
                p.base_url.clone(),
                cfg.agent.max_tokens,
            )))
        }
        "openai" => {
            let p = cfg
                .providers
                .openai
                .as_ref()
                .context("provider is 'openai' but [providers.openai] is missing")?;
            Ok(Arc::new(OpenAiAdapter::new(
                config::expand_str(&p.api_key),
                p.model.clone(),
                p.base_url.clone(),
                cfg.agent.max_tokens,
            )))
        }
        "google" => {
            let p = cfg
                .providers
                .google
                .as_ref()
                .context("provider is 'google' but [providers.google] is missing")?;
            Ok(Arc::new(GeminiAdapter::new(
                config::expand_str(&p.api_key),
                p.model.clone(),
                cfg.agent.max_tokens,
            )))
        }
        other => bail!("unknown provider '{other}'"),
    }
}

fn parse_times(raw: &[String]) -> Result<Vec<TimeOfDay>> {
    raw.iter()
        .map(|t| match t.trim().to_lowercase().as_str() {
            "morning" => Ok(TimeOfDay::Morning),
            "afternoon" => Ok(TimeOfDay::Afternoon),
            "evening" => Ok(TimeOfDay::Evening),
            other => bail!("unknown time of day '{other}' (expected morning, afternoon, evening)"),
        })
        .collect()
}
