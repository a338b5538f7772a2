//! LLM integration for line-movement analysis.
//!
//! Defines the `LineAnalyst` trait, the request/response contract shared
//! by every provider, and implementations for OpenRouter and Anthropic.
//! Providers only move text; prompt construction and reply parsing live
//! here so both behave identically.

pub mod anthropic;
pub mod openrouter;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EventHistory, MarketKind, OddsSnapshot, Pick, Recommendation};

/// Longest reasoning text persisted with a recommendation.
const MAX_REASONING_CHARS: usize = 2000;

// ---------------------------------------------------------------------------
// Request contract
// ---------------------------------------------------------------------------

/// One point of the odds time series sent to the analyst.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub home_spread_point: Option<f64>,
    pub total_point: Option<f64>,
}

impl From<&OddsSnapshot> for HistoryPoint {
    fn from(s: &OddsSnapshot) -> Self {
        Self {
            timestamp: s.timestamp,
            home_moneyline: s.home_moneyline,
            away_moneyline: s.away_moneyline,
            home_spread_point: s.home_spread_point,
            total_point: s.total_point,
        }
    }
}

/// Everything a provider needs for one game.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub system_prompt: String,
    pub query: String,
}

impl AnalysisRequest {
    /// Build the request for a flagged game from its full history.
    /// Fails on an empty history.
    pub fn for_game(history: &EventHistory, triggers: &[MarketKind]) -> Result<Self> {
        let latest = history
            .latest()
            .ok_or_else(|| anyhow!("No snapshots for event {}", history.event_id))?;
        let latest = &latest.snapshot;

        let points: Vec<HistoryPoint> = history
            .snapshots()
            .iter()
            .map(|s| HistoryPoint::from(&s.snapshot))
            .collect();
        let history_json =
            serde_json::to_string_pretty(&points).context("Failed to serialise odds history")?;

        let moved = if triggers.is_empty() {
            "unknown".to_string()
        } else {
            triggers.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
        };

        let query = format!(
            "Game: {} ({})\n\
             Home team: {}\n\
             Away team: {}\n\
             Markets that moved: {moved}\n\
             Odds History (JSON, decimal odds, oldest first):\n{history_json}\n\n\
             Based ONLY on the line movement, what is the sharpest play?",
            latest.matchup(),
            latest.sport,
            latest.home_team,
            latest.away_team,
        );

        Ok(Self {
            event_id: history.event_id.clone(),
            home_team: latest.home_team.clone(),
            away_team: latest.away_team.clone(),
            system_prompt: system_prompt().to_string(),
            query,
        })
    }
}

/// System role shared by every provider.
pub fn system_prompt() -> &'static str {
    "You are a world-class sports betting analyst. You read how a sportsbook's \
     lines moved over time (moneyline, point spread, game total) and judge \
     whether the movement reflects sharp money worth following.\n\n\
     RULES:\n\
     1. Reason only from the odds history you are given.\n\
     2. A move toward one side (shortening decimal odds, spread moving through \
        key numbers, total climbing or falling) is the main signal.\n\
     3. If the movement is noise, say so and pick Pass.\n\
     4. Reply with a single JSON object and nothing else:\n\
        {\"reasoning\": \"<2-4 sentences>\", \"outcome\": \"Home|Away|Over|Under|Pass\", \"confidence\": 0.XX}\n\
     5. confidence is between 0 and 1."
}

// ---------------------------------------------------------------------------
// Response contract
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawRecommendation {
    reasoning: String,
    outcome: String,
    #[serde(default)]
    confidence: serde_json::Value,
}

/// Parse an analyst reply into a `Recommendation`.
///
/// Accepts the JSON object bare, fenced in Markdown, or embedded in prose.
/// `outcome` may be a pick label or a team name. Confidence above 1 and
/// at most 100 is read as a percentage.
pub fn parse_recommendation(text: &str, request: &AnalysisRequest) -> Result<Recommendation> {
    let raw = first_recommendation_object(text)
        .ok_or_else(|| anyhow!("No recommendation object in analyst reply"))?;

    let reasoning = raw.reasoning.trim();
    if reasoning.is_empty() {
        anyhow::bail!("Analyst reply has empty reasoning");
    }

    let outcome = resolve_outcome(&raw.outcome, request)?;

    let confidence = crate::odds::coerce::number_or_none(&raw.confidence)
        .ok_or_else(|| anyhow!("Analyst reply has no numeric confidence"))?;
    let confidence = if confidence > 1.0 && confidence <= 100.0 {
        confidence / 100.0
    } else {
        confidence
    };
    if !(0.0..=1.0).contains(&confidence) {
        anyhow::bail!("Analyst confidence out of range: {confidence}");
    }

    Ok(Recommendation {
        reasoning: truncate(reasoning, MAX_REASONING_CHARS),
        outcome,
        confidence,
    })
}

/// Map an outcome label or team name to a `Pick`.
fn resolve_outcome(label: &str, request: &AnalysisRequest) -> Result<Pick> {
    let label = label.trim();
    if label.eq_ignore_ascii_case(&request.home_team) {
        return Ok(Pick::Home);
    }
    if label.eq_ignore_ascii_case(&request.away_team) {
        return Ok(Pick::Away);
    }
    label.parse::<Pick>()
}

/// First object in `text` that deserialises as a recommendation.
/// Each `{` is tried as a start; text after the object is ignored.
fn first_recommendation_object(text: &str) -> Option<RawRecommendation> {
    text.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<RawRecommendation>()
            .next()
            .and_then(|parsed| parsed.ok())
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Analyst abstraction
// ---------------------------------------------------------------------------

/// Abstraction over the external analysis collaborator.
///
/// One bounded request per game, no automatic retry. Any error is a
/// per-game failure for the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LineAnalyst: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Recommendation>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
