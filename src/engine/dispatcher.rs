//! Analysis dispatcher.
//!
//! Sends each flagged game's full odds history to the analyst, stages a
//! recommendation for the game's latest snapshot on success, and commits
//! every staged recommendation as one batch at the end. A failing game
//! is logged and skipped; it is retried naturally on the next run.

use anyhow::{Context, Result};
use std::fmt;
use tracing::{debug, info, warn};

use super::detector::FlaggedGame;
use crate::llm::{AnalysisRequest, LineAnalyst};
use crate::storage::SnapshotRepository;
use crate::types::RecommendationUpdate;

/// Per-game progress through one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Pending,
    AnalysisRequested,
    /// Terminal; persisted with the batch.
    Recommended,
    /// Terminal for this run.
    Failed,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameState::Pending => write!(f, "pending"),
            GameState::AnalysisRequested => write!(f, "analysis-requested"),
            GameState::Recommended => write!(f, "recommended"),
            GameState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one analysis run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Final state per event id, in dispatch order.
    pub states: Vec<(String, GameState)>,
    pub recommended: usize,
    pub failed: usize,
    pub documents_updated: usize,
}

impl DispatchReport {
    pub fn state_of(&self, event_id: &str) -> Option<GameState> {
        self.states
            .iter()
            .find(|(id, _)| id == event_id)
            .map(|(_, s)| *s)
    }
}

pub struct AnalysisDispatcher<'a> {
    analyst: &'a dyn LineAnalyst,
    repo: &'a dyn SnapshotRepository,
}

impl<'a> AnalysisDispatcher<'a> {
    pub fn new(analyst: &'a dyn LineAnalyst, repo: &'a dyn SnapshotRepository) -> Self {
        Self { analyst, repo }
    }

    /// Analyse every flagged game in order, then commit the staged batch.
    ///
    /// Only the final commit can fail the run.
    pub async fn dispatch(&self, flagged: &[FlaggedGame]) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let mut staged: Vec<RecommendationUpdate> = Vec::new();
        let total = flagged.len();

        for (i, game) in flagged.iter().enumerate() {
            let event_id = game.history.event_id.clone();
            let Some(latest) = game.history.latest() else {
                warn!(event_id = %event_id, "Flagged game has no snapshots, skipping");
                report.failed += 1;
                report.states.push((event_id, GameState::Failed));
                continue;
            };
            let mut state = GameState::Pending;
            debug!(event_id = %event_id, %state, "Game queued");
            info!(
                progress = format!("{}/{}", i + 1, total),
                event_id = %event_id,
                matchup = %latest.snapshot.matchup(),
                "Analysing game"
            );

            match AnalysisRequest::for_game(&game.history, &game.triggers) {
                Ok(request) => {
                    state = GameState::AnalysisRequested;
                    debug!(event_id = %event_id, %state, "Request sent");

                    match self.analyst.analyze(&request).await {
                        Ok(recommendation) => {
                            state = GameState::Recommended;
                            staged.push(RecommendationUpdate {
                                document_id: latest.id.clone(),
                                recommendation,
                            });
                        }
                        Err(e) => {
                            warn!(event_id = %event_id, error = format!("{e:#}"), "Analysis failed, skipping game");
                            state = GameState::Failed;
                        }
                    }
                }
                Err(e) => {
                    warn!(event_id = %event_id, error = format!("{e:#}"), "Could not build analysis request");
                    state = GameState::Failed;
                }
            }

            match state {
                GameState::Recommended => report.recommended += 1,
                _ => report.failed += 1,
            }
            report.states.push((event_id, state));
        }

        if !staged.is_empty() {
            report.documents_updated = self
                .repo
                .apply_recommendations(&staged)
                .await
                .context("Failed to commit recommendation batch")?;
        }

        info!(
            recommended = report.recommended,
            failed = report.failed,
            updated = report.documents_updated,
            "Analysis run complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detector::LineMovement;
    use crate::llm::MockLineAnalyst;
    use crate::storage::memory::InMemoryRepository;
    use crate::types::{EventHistory, MarketKind, OddsSnapshot, Pick, Recommendation, StoredSnapshot};
    use chrono::{Duration, Utc};

    fn game(event_id: &str, ids: [&str; 2]) -> (FlaggedGame, Vec<StoredSnapshot>) {
        let t0 = Utc::now();
        let first = StoredSnapshot::new(ids[0], OddsSnapshot::sample(event_id, t0));
        let mut late = OddsSnapshot::sample(event_id, t0 + Duration::minutes(30));
        late.home_moneyline = Some(1.50);
        let last = StoredSnapshot::new(ids[1], late);
        let docs = vec![first.clone(), last.clone()];
        let history = EventHistory::new(event_id, vec![first, last]);
        let movement = LineMovement::between(
            &history.first().unwrap().snapshot,
            &history.latest().unwrap().snapshot,
        );
        (
            FlaggedGame {
                history,
                movement,
                triggers: vec![MarketKind::Moneyline],
            },
            docs,
        )
    }

    fn rec(outcome: Pick) -> Recommendation {
        Recommendation {
            reasoning: "Home steamed from 1.80 to 1.50.".into(),
            outcome,
            confidence: 0.7,
        }
    }

    #[tokio::test]
    async fn test_recommendation_attached_to_latest_snapshot() {
        let (g, docs) = game("e1", ["old", "new"]);
        let repo = InMemoryRepository::with_documents(docs);
        let mut analyst = MockLineAnalyst::new();
        analyst
            .expect_analyze()
            .times(1)
            .withf(|req| req.event_id == "e1" && req.query.contains("1.5"))
            .returning(|_| Ok(rec(Pick::Home)));

        let report = AnalysisDispatcher::new(&analyst, &repo).dispatch(&[g]).await.unwrap();

        assert_eq!(report.recommended, 1);
        assert_eq!(report.documents_updated, 1);
        assert_eq!(report.state_of("e1"), Some(GameState::Recommended));
        let stored = repo.documents();
        assert!(stored.iter().find(|d| d.id == "old").unwrap().recommendation.is_none());
        assert_eq!(
            stored.iter().find(|d| d.id == "new").unwrap().recommendation,
            Some(rec(Pick::Home))
        );
    }

    #[tokio::test]
    async fn test_failed_game_does_not_block_others() {
        let (g1, mut docs) = game("e1", ["a1", "a2"]);
        let (g2, docs2) = game("e2", ["b1", "b2"]);
        docs.extend(docs2);
        let repo = InMemoryRepository::with_documents(docs);

        let mut analyst = MockLineAnalyst::new();
        analyst.expect_analyze().times(2).returning(|req| {
            if req.event_id == "e1" {
                anyhow::bail!("analyst unavailable")
            }
            Ok(rec(Pick::Over))
        });

        let report = AnalysisDispatcher::new(&analyst, &repo)
            .dispatch(&[g1, g2])
            .await
            .unwrap();

        assert_eq!(report.state_of("e1"), Some(GameState::Failed));
        assert_eq!(report.state_of("e2"), Some(GameState::Recommended));
        assert_eq!(report.failed, 1);
        assert_eq!(report.documents_updated, 1);
        let with_rec: Vec<String> = repo
            .documents()
            .into_iter()
            .filter(|d| d.recommendation.is_some())
            .map(|d| d.id)
            .collect();
        assert_eq!(with_rec, vec!["b2".to_string()]);
    }

    #[tokio::test]
    async fn test_no_commit_when_everything_fails() {
        let (g, docs) = game("e1", ["a1", "a2"]);
        let repo = InMemoryRepository::with_documents(docs);
        let mut analyst = MockLineAnalyst::new();
        analyst
            .expect_analyze()
            .returning(|_| anyhow::bail!("malformed response"));

        let report = AnalysisDispatcher::new(&analyst, &repo).dispatch(&[g]).await.unwrap();
        assert_eq!(report.documents_updated, 0);
        assert!(repo.documents().iter().all(|d| d.recommendation.is_none()));
    }

    #[tokio::test]
    async fn test_commit_failure_propagates() {
        let (g, _) = game("e1", ["a1", "a2"]);
        // Store does not contain the documents the update targets.
        let repo = InMemoryRepository::new();
        let mut analyst = MockLineAnalyst::new();
        analyst.expect_analyze().returning(|_| Ok(rec(Pick::Pass)));

        let result = AnalysisDispatcher::new(&analyst, &repo).dispatch(&[g]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let repo = InMemoryRepository::new();
        let analyst = MockLineAnalyst::new();
        let report = AnalysisDispatcher::new(&analyst, &repo).dispatch(&[]).await.unwrap();
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn test_empty_history_recorded_as_failed() {
        let (mut g, _) = game("e1", ["a1", "a2"]);
        g.history = EventHistory::new("e1", Vec::new());
        let repo = InMemoryRepository::new();
        // No expectations: any analyst call fails the test.
        let analyst = MockLineAnalyst::new();

        let report = AnalysisDispatcher::new(&analyst, &repo).dispatch(&[g]).await.unwrap();
        assert_eq!(report.state_of("e1"), Some(GameState::Failed));
        assert_eq!(report.failed, 1);
        assert_eq!(report.documents_updated, 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(GameState::AnalysisRequested.to_string(), "analysis-requested");
    }
}
