//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`. Every field has a default,
//! so an empty file yields a working configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::types::PipelineError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub feed: FeedConfig,
    pub thresholds: MovementThresholds,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppSection {
    /// Application identifier; the collection path is derived from it.
    pub app_id: String,
    /// The single bookmaker whose quotes are treated as canonical.
    pub reference_bookmaker: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            app_id: "default-canvas-app-id".to_string(),
            reference_bookmaker: "DraftKings".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub regions: String,
    pub odds_format: String,
    /// Sport keys polled on every ingestion run, in order.
    pub sports: Vec<String>,
    /// Pause between consecutive sports (rate limiting, not a retry).
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.the-odds-api.com/v4/sports".to_string(),
            api_key_env: "ODDS_API_KEY".to_string(),
            regions: "us".to_string(),
            odds_format: "decimal".to_string(),
            sports: [
                "americanfootball_nfl",
                "americanfootball_ncaaf",
                "basketball_nba",
                "icehockey_nhl",
                "baseball_mlb",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            request_delay_ms: 2000,
            timeout_secs: 30,
        }
    }
}

/// Minimum first-to-latest movement that flags a game.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MovementThresholds {
    /// Decimal-odds units on the home moneyline.
    pub moneyline: f64,
    /// Points on the home spread.
    pub spread: f64,
    /// Points on the game total.
    pub total: f64,
}

impl Default for MovementThresholds {
    fn default() -> Self {
        Self {
            moneyline: 0.20,
            spread: 1.0,
            total: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sharpline.db".to_string(),
            max_connections: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// When false the analyze phase only reports flagged games.
    pub enabled: bool,
    /// "openrouter" | "anthropic"
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openrouter".to_string(),
            model: "anthropic/claude-sonnet-4".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse configuration TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.app.app_id.trim().is_empty() {
            return Err(PipelineError::Config("app.app_id must not be empty".into()).into());
        }
        if self.app.reference_bookmaker.trim().is_empty() {
            return Err(
                PipelineError::Config("app.reference_bookmaker must not be empty".into()).into(),
            );
        }
        if self.feed.sports.iter().all(|s| s.trim().is_empty()) {
            return Err(PipelineError::Config("feed.sports must list at least one sport".into()).into());
        }
        let t = &self.thresholds;
        for (name, value) in [("moneyline", t.moneyline), ("spread", t.spread), ("total", t.total)] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::Config(format!(
                    "thresholds.{name} must be a non-negative number, got {value}"
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Document collection all snapshots are written to.
    pub fn collection_path(&self) -> String {
        format!("artifacts/{}/public/data/sports_odds", self.app.app_id)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
