//! Line-movement detector.
//!
//! Groups every stored snapshot by game, compares each game's earliest
//! and latest snapshot, and flags games whose moneyline, spread or total
//! moved by at least the configured threshold. Games that have already
//! started are ignored. Pure computation apart from the initial load.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::MovementThresholds;
use crate::storage::SnapshotRepository;
use crate::types::{EventHistory, MarketKind, OddsSnapshot, StoredSnapshot};

/// Absolute slack when comparing a delta to its threshold, so that
/// decimal moves like 1.80 → 2.00 meet a 0.20 threshold despite
/// binary rounding.
const THRESHOLD_TOLERANCE: f64 = 1e-9;

/// Absolute first-to-latest deltas. Absent values count as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMovement {
    pub moneyline: f64,
    pub spread: f64,
    pub total: f64,
}

impl LineMovement {
    pub fn between(first: &OddsSnapshot, last: &OddsSnapshot) -> Self {
        let delta = |a: Option<f64>, b: Option<f64>| (a.unwrap_or(0.0) - b.unwrap_or(0.0)).abs();
        Self {
            moneyline: delta(first.home_moneyline, last.home_moneyline),
            spread: delta(first.home_spread_point, last.home_spread_point),
            total: delta(first.total_point, last.total_point),
        }
    }

    /// Markets whose delta meets or exceeds its threshold.
    pub fn triggered(&self, thresholds: &MovementThresholds) -> Vec<MarketKind> {
        let meets = |delta: f64, threshold: f64| delta + THRESHOLD_TOLERANCE >= threshold;
        let mut out = Vec::new();
        if meets(self.moneyline, thresholds.moneyline) {
            out.push(MarketKind::Moneyline);
        }
        if meets(self.spread, thresholds.spread) {
            out.push(MarketKind::Spread);
        }
        if meets(self.total, thresholds.total) {
            out.push(MarketKind::Total);
        }
        out
    }
}

/// A game whose lines moved enough to analyse.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedGame {
    pub history: EventHistory,
    pub movement: LineMovement,
    /// Non-empty.
    pub triggers: Vec<MarketKind>,
}

pub struct MovementDetector {
    thresholds: MovementThresholds,
}

impl MovementDetector {
    pub fn new(thresholds: MovementThresholds) -> Self {
        Self { thresholds }
    }

    /// Group snapshots by event id, preserving order of first appearance.
    /// Snapshots without an event id are dropped.
    pub fn group_by_event(snapshots: Vec<StoredSnapshot>) -> Vec<EventHistory> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(String, Vec<StoredSnapshot>)> = Vec::new();

        for stored in snapshots {
            let event_id = stored.snapshot.event_id.clone();
            if event_id.is_empty() {
                continue;
            }
            match index.get(&event_id) {
                Some(&i) => groups[i].1.push(stored),
                None => {
                    index.insert(event_id.clone(), groups.len());
                    groups.push((event_id, vec![stored]));
                }
            }
        }

        groups
            .into_iter()
            .map(|(event_id, snaps)| EventHistory::new(event_id, snaps))
            .collect()
    }

    /// Evaluate one history. `None` when it does not qualify.
    pub fn evaluate(&self, history: EventHistory, now: DateTime<Utc>) -> Option<FlaggedGame> {
        if history.len() < 2 {
            return None;
        }
        let first = &history.first()?.snapshot;
        let last = &history.latest()?.snapshot;

        if last.has_started(now) {
            debug!(event_id = %history.event_id, "Game already started, skipping");
            return None;
        }

        let movement = LineMovement::between(first, last);
        let triggers = movement.triggered(&self.thresholds);
        if triggers.is_empty() {
            return None;
        }

        Some(FlaggedGame {
            history,
            movement,
            triggers,
        })
    }

    /// Flag every qualifying game among `snapshots`, in order of first appearance.
    pub fn detect(&self, snapshots: Vec<StoredSnapshot>, now: DateTime<Utc>) -> Vec<FlaggedGame> {
        let histories = Self::group_by_event(snapshots);
        info!(games = histories.len(), "Unique games in store");

        histories
            .into_iter()
            .filter_map(|h| self.evaluate(h, now))
            .collect()
    }

    /// Load the whole store and run `detect`.
    pub async fn scan(
        &self,
        repo: &dyn SnapshotRepository,
        now: DateTime<Utc>,
    ) -> Result<Vec<FlaggedGame>> {
        let snapshots = repo.load_all().await.context("Failed to load snapshots")?;
        let flagged = self.detect(snapshots, now);

        if flagged.is_empty() {
            info!("No games with significant, unplayed line movement found");
        } else {
            info!(count = flagged.len(), "Games meet the movement thresholds");
            for game in &flagged {
                if let Some(latest) = game.history.latest() {
                    debug!(
                        event_id = %game.history.event_id,
                        latest = %latest.snapshot,
                        snapshots = game.history.len(),
                        moneyline = game.movement.moneyline,
                        spread = game.movement.spread,
                        total = game.movement.total,
                        "Flagged game"
                    );
                }
            }
        }
        Ok(flagged)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
