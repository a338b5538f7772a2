//! Mock odds feed for integration testing.
//!
//! Provides a deterministic `OddsFeed` that serves scripted events per
//! sport and can be told to fail individual sports, all in-memory with
//! no network access.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

use sharpline::odds::{FeedEvent, OddsFeed};
use sharpline::types::PipelineError;

/// Quotes for one game at one moment.
#[derive(Debug, Clone, Copy)]
pub struct Quotes {
    pub home_ml: f64,
    pub away_ml: f64,
    pub home_spread: f64,
    pub total: f64,
}

impl Default for Quotes {
    fn default() -> Self {
        Self {
            home_ml: 1.80,
            away_ml: 2.05,
            home_spread: -3.5,
            total: 44.5,
        }
    }
}

/// Build a feed event with a full DraftKings line and a decoy bookmaker.
pub fn event(
    id: &str,
    home: &str,
    away: &str,
    commence: DateTime<Utc>,
    quotes: Quotes,
) -> FeedEvent {
    serde_json::from_value(json!({
        "id": id,
        "sport_key": "americanfootball_nfl",
        "sport_title": "NFL",
        "commence_time": commence.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        "home_team": home,
        "away_team": away,
        "bookmakers": [
            {"key": "fanduel", "title": "FanDuel", "markets": [
                {"key": "h2h", "outcomes": [
                    {"name": home, "price": 9.99},
                    {"name": away, "price": 9.99}
                ]}
            ]},
            {"key": "draftkings", "title": "DraftKings", "markets": [
                {"key": "h2h", "outcomes": [
                    {"name": home, "price": quotes.home_ml},
                    {"name": away, "price": quotes.away_ml}
                ]},
                {"key": "spreads", "outcomes": [
                    {"name": home, "price": 1.91, "point": quotes.home_spread},
                    {"name": away, "price": 1.91, "point": -quotes.home_spread}
                ]},
                {"key": "totals", "outcomes": [
                    {"name": "Over", "price": 1.87, "point": quotes.total},
                    {"name": "Under", "price": 1.95, "point": quotes.total}
                ]}
            ]}
        ]
    }))
    .unwrap_or_else(|e| panic!("bad fixture {id}: {e}"))
}

/// A scripted odds feed.
///
/// Each sport serves whatever was last set for it; sports marked as
/// failing return a transport-style `PipelineError::Feed`.
#[derive(Default)]
pub struct MockFeed {
    events: Mutex<HashMap<String, Vec<FeedEvent>>>,
    failing: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the events served for `sport`.
    pub fn set_events(&self, sport: &str, events: Vec<FeedEvent>) {
        self.events.lock().unwrap().insert(sport.to_string(), events);
    }

    /// Make every fetch for `sport` fail.
    pub fn fail_sport(&self, sport: &str) {
        self.failing.lock().unwrap().push(sport.to_string());
    }

    /// Sports fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OddsFeed for MockFeed {
    async fn fetch_odds(&self, sport: &str) -> Result<Vec<FeedEvent>> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("mock feed lock poisoned"))?
            .push(sport.to_string());

        let failing = self
            .failing
            .lock()
            .map_err(|_| anyhow!("mock feed lock poisoned"))?
            .contains(&sport.to_string());
        if failing {
            return Err(PipelineError::Feed {
                sport: sport.to_string(),
                message: "connection reset by peer".to_string(),
            }
            .into());
        }

        Ok(self
            .events
            .lock()
            .map_err(|_| anyhow!("mock feed lock poisoned"))?
            .get(sport)
            .cloned()
            .unwrap_or_default())
    }
}
