//! Odds feed integration.
//!
//! Defines the `OddsFeed` trait, the wire types of the upstream feed,
//! and the pieces that turn feed events into `OddsSnapshot`s.

pub mod coerce;
pub mod normalizer;
pub mod the_odds_api;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One game as listed by the feed. Only consumed fields are modelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEvent {
    pub id: String,
    pub sport_title: String,
    /// ISO-8601, usually with a trailing `Z`.
    pub commence_time: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub bookmakers: Vec<FeedBookmaker>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedBookmaker {
    pub title: String,
    #[serde(default)]
    pub markets: Vec<FeedMarket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedMarket {
    /// "h2h" | "spreads" | "totals"
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<FeedOutcome>,
}

/// A priced outcome. `price` and `point` are kept raw and coerced later,
/// so one malformed number never rejects the whole payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedOutcome {
    pub name: String,
    #[serde(default)]
    pub price: serde_json::Value,
    #[serde(default)]
    pub point: serde_json::Value,
}

impl FeedEvent {
    /// Parse `commence_time`. Accepts RFC 3339 and naive timestamps
    /// (read as UTC). Returns `None` when neither matches.
    pub fn commence_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.commence_time.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Find a bookmaker by exact title.
    pub fn bookmaker(&self, title: &str) -> Option<&FeedBookmaker> {
        self.bookmakers.iter().find(|b| b.title == title)
    }
}

impl FeedBookmaker {
    /// Outcomes of the first market with the given key.
    pub fn outcomes(&self, key: &str) -> &[FeedOutcome] {
        self.markets
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.outcomes.as_slice())
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Feed abstraction
// ---------------------------------------------------------------------------

/// Abstraction over the upstream odds provider.
///
/// One call per sport; each call is a single bounded request with no
/// automatic retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Fetch current odds for every tracked market of one sport.
    async fn fetch_odds(&self, sport: &str) -> Result<Vec<FeedEvent>>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
