//! End-to-end pipeline scenarios.

use chrono::{DateTime, Duration, Utc};

use sharpline::config::AppConfig;
use sharpline::engine::collector::IngestionCollector;
use sharpline::engine::detector::MovementDetector;
use sharpline::engine::dispatcher::{AnalysisDispatcher, GameState};
use sharpline::storage::memory::InMemoryRepository;
use sharpline::storage::sqlite::SqliteRepository;
use sharpline::storage::SnapshotRepository;
use sharpline::types::{MarketKind, Pick};

use crate::mock_analyst::ScriptedAnalyst;
use crate::mock_feed::{event, MockFeed, Quotes};

const NFL: &str = "americanfootball_nfl";
const NBA: &str = "basketball_nba";

fn config(sports: &[&str]) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.feed.sports = sports.iter().map(|s| s.to_string()).collect();
    cfg.feed.request_delay_ms = 0;
    cfg
}

fn cutoff() -> DateTime<Utc> {
    Utc::now() + Duration::days(1)
}

async fn sqlite(cfg: &AppConfig) -> SqliteRepository {
    SqliteRepository::in_memory(&cfg.collection_path())
        .await
        .unwrap()
}

/// Two ingestion rounds covering the four reference scenarios:
/// E1 moneyline 1.80 → 2.05, E2 total 44.5 → 45.0 only, E3 seen once,
/// E4 already kicked off an hour ago.
async fn seed_two_rounds(feed: &MockFeed, repo: &dyn SnapshotRepository, cfg: &AppConfig) {
    let later = Utc::now() + Duration::hours(3);
    let started = Utc::now() - Duration::hours(1);
    let base = Quotes::default();

    feed.set_events(
        NFL,
        vec![
            event("E1", "Kansas City Chiefs", "Buffalo Bills", later, base),
            event("E2", "Dallas Cowboys", "New York Giants", later, base),
            event("E3", "Green Bay Packers", "Chicago Bears", later, base),
            event("E4", "Miami Dolphins", "New York Jets", started, base),
        ],
    );
    let first = IngestionCollector::new(feed, repo, cfg).run_until(cutoff()).await;
    assert_eq!(first.snapshots_saved, 4);

    feed.set_events(
        NFL,
        vec![
            event(
                "E1",
                "Kansas City Chiefs",
                "Buffalo Bills",
                later,
                Quotes { home_ml: 2.05, ..base },
            ),
            event(
                "E2",
                "Dallas Cowboys",
                "New York Giants",
                later,
                Quotes { total: 45.0, ..base },
            ),
            event(
                "E4",
                "Miami Dolphins",
                "New York Jets",
                started,
                Quotes { home_ml: 3.40, total: 51.5, ..base },
            ),
        ],
    );
    let second = IngestionCollector::new(feed, repo, cfg).run_until(cutoff()).await;
    assert_eq!(second.snapshots_saved, 3);
}

#[tokio::test]
async fn test_reference_scenarios() {
    let cfg = config(&[NFL]);
    let repo = sqlite(&cfg).await;
    let feed = MockFeed::new();
    seed_two_rounds(&feed, &repo, &cfg).await;

    let flagged = MovementDetector::new(cfg.thresholds)
        .scan(&repo, Utc::now())
        .await
        .unwrap();

    let ids: Vec<&str> = flagged.iter().map(|g| g.history.event_id.as_str()).collect();
    assert_eq!(ids, vec!["E1"]);
    assert_eq!(flagged[0].triggers, vec![MarketKind::Moneyline]);
    assert!((flagged[0].movement.moneyline - 0.25).abs() < 1e-9);
    assert_eq!(flagged[0].movement.spread, 0.0);
}

#[tokio::test]
async fn test_detection_is_idempotent() {
    let cfg = config(&[NFL]);
    let repo = sqlite(&cfg).await;
    let feed = MockFeed::new();
    seed_two_rounds(&feed, &repo, &cfg).await;

    let detector = MovementDetector::new(cfg.thresholds);
    let now = Utc::now();
    let first = detector.scan(&repo, now).await.unwrap();
    let second = detector.scan(&repo, now).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_transport_failure_isolated_per_sport() {
    let cfg = config(&[NBA, NFL]);
    let repo = InMemoryRepository::new();
    let feed = MockFeed::new();
    feed.fail_sport(NBA);
    feed.set_events(
        NFL,
        vec![event(
            "E1",
            "Kansas City Chiefs",
            "Buffalo Bills",
            Utc::now() + Duration::hours(2),
            Quotes::default(),
        )],
    );

    let report = IngestionCollector::new(&feed, &repo, &cfg)
        .run_until(cutoff())
        .await;

    assert_eq!(feed.calls(), vec![NBA.to_string(), NFL.to_string()]);
    assert_eq!(report.sports_attempted, 2);
    assert_eq!(report.sports_failed, vec![NBA.to_string()]);
    assert_eq!(report.snapshots_saved, 1);
    let stored = repo.documents();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].snapshot.event_id, "E1");
    assert_eq!(stored[0].snapshot.home_moneyline, Some(1.80));
    assert_eq!(stored[0].snapshot.total_under_price, Some(1.95));
}

#[tokio::test]
async fn test_games_after_today_not_ingested() {
    let cfg = config(&[NFL]);
    let repo = InMemoryRepository::new();
    let feed = MockFeed::new();
    let cut = cutoff();
    feed.set_events(
        NFL,
        vec![
            event("soon", "A", "B", cut - Duration::minutes(1), Quotes::default()),
            event("later", "C", "D", cut + Duration::minutes(1), Quotes::default()),
        ],
    );

    let report = IngestionCollector::new(&feed, &repo, &cfg).run_until(cut).await;
    assert_eq!(report.events_received, 2);
    assert_eq!(report.events_not_today, 1);
    let ids: Vec<String> = repo.documents().into_iter().map(|d| d.snapshot.event_id).collect();
    assert_eq!(ids, vec!["soon".to_string()]);
}

#[tokio::test]
async fn test_full_run_writes_back_to_latest_snapshot() {
    let cfg = config(&[NFL]);
    let repo = sqlite(&cfg).await;
    let feed = MockFeed::new();
    seed_two_rounds(&feed, &repo, &cfg).await;

    let flagged = MovementDetector::new(cfg.thresholds)
        .scan(&repo, Utc::now())
        .await
        .unwrap();
    let analyst = ScriptedAnalyst::new().reply(
        "E1",
        "Sharp money is on the road side.\n```json\n{\"reasoning\": \"Chiefs drifted from 1.80 to 2.05 while the spread held.\", \"outcome\": \"Buffalo Bills\", \"confidence\": 68}\n```",
    );

    let report = AnalysisDispatcher::new(&analyst, &repo)
        .dispatch(&flagged)
        .await
        .unwrap();
    assert_eq!(report.state_of("E1"), Some(GameState::Recommended));
    assert_eq!(report.documents_updated, 1);

    let requests = analyst.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].query.contains("Kansas City Chiefs vs Buffalo Bills"));
    assert!(requests[0].query.contains("2.05"));

    let e1: Vec<_> = repo
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .filter(|d| d.snapshot.event_id == "E1")
        .collect();
    assert_eq!(e1.len(), 2);
    assert!(e1[0].recommendation.is_none());
    let rec = e1[1].recommendation.as_ref().unwrap();
    assert_eq!(rec.outcome, Pick::Away);
    assert!((rec.confidence - 0.68).abs() < 1e-9);
    assert_eq!(e1[1].snapshot.home_moneyline, Some(2.05));
}

#[tokio::test]
async fn test_failed_analysis_is_retried_next_run() {
    let cfg = config(&[NFL]);
    let repo = sqlite(&cfg).await;
    let feed = MockFeed::new();
    seed_two_rounds(&feed, &repo, &cfg).await;
    let detector = MovementDetector::new(cfg.thresholds);

    // No scripted reply: the analyst fails for E1.
    let silent = ScriptedAnalyst::new();
    let flagged = detector.scan(&repo, Utc::now()).await.unwrap();
    let report = AnalysisDispatcher::new(&silent, &repo)
        .dispatch(&flagged)
        .await
        .unwrap();
    assert_eq!(report.state_of("E1"), Some(GameState::Failed));
    assert_eq!(report.documents_updated, 0);
    assert!(repo
        .load_all()
        .await
        .unwrap()
        .iter()
        .all(|d| d.recommendation.is_none()));

    // The game is still flagged on the next run and succeeds this time.
    let answering = ScriptedAnalyst::new().reply(
        "E1",
        r#"{"reasoning": "Movement is within normal noise.", "outcome": "Pass", "confidence": 0.35}"#,
    );
    let flagged = detector.scan(&repo, Utc::now()).await.unwrap();
    assert_eq!(flagged.len(), 1);
    let report = AnalysisDispatcher::new(&answering, &repo)
        .dispatch(&flagged)
        .await
        .unwrap();
    assert_eq!(report.recommended, 1);
    let with_rec = repo
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .filter(|d| d.recommendation.is_some())
        .count();
    assert_eq!(with_rec, 1);
}
