//! Shared types for Sharpline.
//!
//! These types form the data model used across all modules. Feed
//! wire types live in `odds`; everything here is already normalised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One bookmaker's quoted lines for one game at one capture instant.
///
/// Odds are decimal. Every numeric field is either a finite float or
/// `None`; absence is never encoded as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsSnapshot {
    /// When this system captured the quote (not the feed's own timestamp).
    pub timestamp: DateTime<Utc>,
    /// Feed-assigned game identifier, stable across snapshots.
    pub event_id: String,
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub bookmaker: String,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub home_spread_point: Option<f64>,
    pub home_spread_price: Option<f64>,
    pub total_point: Option<f64>,
    pub total_over_price: Option<f64>,
    pub total_under_price: Option<f64>,
}

impl OddsSnapshot {
    /// "Home vs Away" label used in logs and analysis prompts.
    pub fn matchup(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    /// Whether the game had already started at `now`.
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.commence_time < now
    }

    /// Helper to build a test snapshot with sensible defaults.
    #[cfg(test)]
    pub fn sample(event_id: &str, timestamp: DateTime<Utc>) -> Self {
        OddsSnapshot {
            timestamp,
            event_id: event_id.to_string(),
            sport: "NBA".to_string(),
            home_team: "Boston Celtics".to_string(),
            away_team: "Miami Heat".to_string(),
            commence_time: timestamp + chrono::Duration::hours(6),
            bookmaker: "DraftKings".to_string(),
            home_moneyline: Some(1.80),
            away_moneyline: Some(2.05),
            home_spread_point: Some(-3.5),
            home_spread_price: Some(1.91),
            total_point: Some(215.5),
            total_over_price: Some(1.91),
            total_under_price: Some(1.91),
        }
    }
}

impl fmt::Display for OddsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let num = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".into());
        write!(
            f,
            "[{}] {} @ {} (ML: {}/{} | spread: {} | total: {})",
            self.sport,
            self.matchup(),
            self.bookmaker,
            num(self.home_moneyline),
            num(self.away_moneyline),
            num(self.home_spread_point),
            num(self.total_point),
        )
    }
}

/// A snapshot as persisted, with its document identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Repository-assigned document id.
    pub id: String,
    pub snapshot: OddsSnapshot,
    /// Recommendation attached by a previous analysis run, if any.
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
}

impl StoredSnapshot {
    pub fn new(id: impl Into<String>, snapshot: OddsSnapshot) -> Self {
        Self {
            id: id.into(),
            snapshot,
            recommendation: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Event history
// ---------------------------------------------------------------------------

/// Every stored snapshot of one game, ordered by capture time.
///
/// Derived on each run from the repository; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EventHistory {
    pub event_id: String,
    snapshots: Vec<StoredSnapshot>,
}

impl EventHistory {
    /// Build a history, sorting by timestamp. The sort is stable so
    /// snapshots captured at the same instant keep their read order.
    pub fn new(event_id: impl Into<String>, mut snapshots: Vec<StoredSnapshot>) -> Self {
        snapshots.sort_by_key(|s| s.snapshot.timestamp);
        Self {
            event_id: event_id.into(),
            snapshots,
        }
    }

    pub fn snapshots(&self) -> &[StoredSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Earliest snapshot.
    pub fn first(&self) -> Option<&StoredSnapshot> {
        self.snapshots.first()
    }

    /// Latest snapshot; recommendations are attached here.
    pub fn latest(&self) -> Option<&StoredSnapshot> {
        self.snapshots.last()
    }
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// Market types tracked for movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketKind {
    Moneyline,
    Spread,
    Total,
}

impl MarketKind {
    pub const ALL: &'static [MarketKind] =
        &[MarketKind::Moneyline, MarketKind::Spread, MarketKind::Total];

    /// Market key used by the odds feed.
    pub fn feed_key(&self) -> &'static str {
        match self {
            MarketKind::Moneyline => "h2h",
            MarketKind::Spread => "spreads",
            MarketKind::Total => "totals",
        }
    }

    /// Comma-separated feed keys for every tracked market.
    pub fn feed_keys() -> String {
        Self::ALL
            .iter()
            .map(|m| m.feed_key())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Moneyline => write!(f, "moneyline"),
            MarketKind::Spread => write!(f, "spread"),
            MarketKind::Total => write!(f, "total"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

/// Categorical outcome returned by the analyst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pick {
    Home,
    Away,
    Over,
    Under,
    /// No play: the movement does not justify a bet.
    Pass,
}

impl Pick {
    /// Label persisted alongside the snapshot.
    pub fn label(&self) -> &'static str {
        match self {
            Pick::Home => "Home",
            Pick::Away => "Away",
            Pick::Over => "Over",
            Pick::Under => "Under",
            Pick::Pass => "Pass",
        }
    }
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parse a pick label (case-insensitive). "No play" style answers map to `Pass`.
impl std::str::FromStr for Pick {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "home" => Ok(Pick::Home),
            "away" => Ok(Pick::Away),
            "over" => Ok(Pick::Over),
            "under" => Ok(Pick::Under),
            "pass" | "no play" | "no_play" | "none" => Ok(Pick::Pass),
            other => anyhow::bail!("Unknown pick label: {other}"),
        }
    }
}

/// Analyst output attached to the latest snapshot of a flagged game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub reasoning: String,
    pub outcome: Pick,
    /// 0.0–1.0
    pub confidence: f64,
}

/// One staged write-back.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationUpdate {
    pub document_id: String,
    pub recommendation: Recommendation,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for Sharpline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Feed error ({sport}): {message}")]
    Feed { sport: String, message: String },

    #[error("Analysis error ({event_id}): {message}")]
    Analysis { event_id: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
