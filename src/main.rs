//! SHARPLINE: odds snapshot collector and line-movement analyst
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the snapshot store, then runs the selected phases once:
//! ingest odds for today's games, detect line movement, and dispatch
//! flagged games for analysis. Scheduling is left to cron or similar.

use anyhow::{Context, Result};
use chrono::Utc;
use secrecy::SecretString;
use std::str::FromStr;
use tracing::{error, info, warn};

use sharpline::config::{self, AppConfig};
use sharpline::engine::collector::IngestionCollector;
use sharpline::engine::detector::MovementDetector;
use sharpline::engine::dispatcher::AnalysisDispatcher;
use sharpline::llm::anthropic::AnthropicClient;
use sharpline::llm::openrouter::OpenRouterClient;
use sharpline::llm::LineAnalyst;
use sharpline::odds::the_odds_api::TheOddsApiClient;
use sharpline::storage::sqlite::SqliteRepository;
use sharpline::types::PipelineError;

const BANNER: &str = r#"
 ____  _   _    _    ____  ____  _     ___ _   _ _____
/ ___|| | | |  / \  |  _ \|  _ \| |   |_ _| \ | | ____|
\___ \| |_| | / _ \ | |_) | |_) | |    | ||  \| |  _|
 ___) |  _  |/ ___ \|  _ <|  __/| |___ | || |\  | |___
|____/|_| |_/_/   \_\_| \_\_|   |_____|___|_| \_|_____|

  Odds snapshots in, line movement out
  v0.1.0
"#;

/// Phases selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Ingest,
    Analyze,
    All,
}

impl RunMode {
    fn ingests(self) -> bool {
        matches!(self, RunMode::Ingest | RunMode::All)
    }

    fn analyzes(self) -> bool {
        matches!(self, RunMode::Analyze | RunMode::All)
    }
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ingest" => Ok(RunMode::Ingest),
            "analyze" | "analyse" => Ok(RunMode::Analyze),
            "all" => Ok(RunMode::All),
            other => anyhow::bail!("Unknown run mode '{other}' (expected ingest, analyze or all)"),
        }
    }
}

/// The configured analysis provider.
enum Analyst {
    OpenRouter(OpenRouterClient),
    Anthropic(AnthropicClient),
}

impl Analyst {
    fn as_analyst(&self) -> &dyn LineAnalyst {
        match self {
            Analyst::OpenRouter(c) => c as &dyn LineAnalyst,
            Analyst::Anthropic(c) => c as &dyn LineAnalyst,
        }
    }

    fn model_name(&self) -> &str {
        match self {
            Analyst::OpenRouter(c) => c.model_name(),
            Analyst::Anthropic(c) => c.model_name(),
        }
    }

    fn cumulative_cost(&self) -> f64 {
        match self {
            Analyst::OpenRouter(c) => c.cumulative_cost(),
            Analyst::Anthropic(c) => c.cumulative_cost(),
        }
    }

    fn total_calls(&self) -> u64 {
        match self {
            Analyst::OpenRouter(c) => c.total_calls(),
            Analyst::Anthropic(c) => c.total_calls(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let mode = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<RunMode>()?,
        None => RunMode::All,
    };

    let config_path =
        std::env::var("SHARPLINE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        mode = ?mode,
        config = %config_path,
        app_id = %cfg.app.app_id,
        bookmaker = %cfg.app.reference_bookmaker,
        sports = cfg.feed.sports.len(),
        "SHARPLINE starting up"
    );

    // -- Storage ----------------------------------------------------------

    let collection = cfg.collection_path();
    let repo = SqliteRepository::connect(
        &cfg.storage.database_url,
        &collection,
        cfg.storage.max_connections,
    )
    .await
    .context("Failed to open snapshot store")?;

    // -- Ingestion --------------------------------------------------------

    if mode.ingests() {
        let feed_key = AppConfig::resolve_env(&cfg.feed.api_key_env)
            .map_err(|e| PipelineError::Config(format!("{e:#}")))?;
        let feed = TheOddsApiClient::new(&cfg.feed, SecretString::new(feed_key))?;

        let report = IngestionCollector::new(&feed, &repo, &cfg).run().await;
        if !report.sports_failed.is_empty() {
            warn!(sports = ?report.sports_failed, "Some sports could not be collected");
        }
    }

    // -- Detection and analysis -------------------------------------------

    if mode.analyzes() {
        let detector = MovementDetector::new(cfg.thresholds);
        let flagged = detector.scan(&repo, Utc::now()).await?;

        match build_analyst(&cfg.llm)? {
            None => {
                if !flagged.is_empty() {
                    warn!(
                        flagged = flagged.len(),
                        "No analyst configured, running in scan-only mode"
                    );
                }
            }
            Some(analyst) if !flagged.is_empty() => {
                let dispatcher = AnalysisDispatcher::new(analyst.as_analyst(), &repo);
                match dispatcher.dispatch(&flagged).await {
                    Ok(report) => info!(
                        recommended = report.recommended,
                        failed = report.failed,
                        model = %analyst.model_name(),
                        calls = analyst.total_calls(),
                        cost = format!("${:.4}", analyst.cumulative_cost()),
                        "Analysis summary"
                    ),
                    Err(e) => {
                        error!(error = format!("{e:#}"), "Analysis run failed");
                        return Err(e);
                    }
                }
            }
            Some(_) => {}
        }
    }

    info!("SHARPLINE finished.");
    Ok(())
}

/// Build the configured analyst, or `None` for scan-only runs.
fn build_analyst(llm: &config::LlmConfig) -> Result<Option<Analyst>> {
    if !llm.enabled {
        info!("LLM analysis disabled in config");
        return Ok(None);
    }

    let api_key = match AppConfig::resolve_env(&llm.api_key_env) {
        Ok(key) if !key.trim().is_empty() => SecretString::new(key),
        _ => {
            warn!(env = %llm.api_key_env, "No LLM API key configured");
            return Ok(None);
        }
    };

    let analyst = match llm.provider.as_str() {
        "anthropic" => {
            info!(model = %llm.model, "Using Anthropic LLM provider");
            Analyst::Anthropic(AnthropicClient::new(
                api_key,
                Some(llm.model.clone()),
                Some(llm.max_tokens),
                Some(llm.timeout_secs),
            )?)
        }
        other => {
            if other != "openrouter" {
                warn!(provider = other, "Unknown LLM provider, defaulting to OpenRouter");
            }
            info!(model = %llm.model, "Using OpenRouter LLM provider");
            Analyst::OpenRouter(OpenRouterClient::new(
                api_key,
                Some(llm.model.clone()),
                Some(llm.max_tokens),
                Some(llm.timeout_secs),
            )?)
        }
    };
    Ok(Some(analyst))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sharpline=info"));

    let json_logging = std::env::var("SHARPLINE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
