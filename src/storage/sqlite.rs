//! SQLite-backed snapshot repository.
//!
//! Documents live in a single `snapshots` table partitioned by a
//! `collection` column, so several app ids can share one database file.
//! Instants are stored as RFC 3339 text with microsecond precision.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::SnapshotRepository;
use crate::types::{
    OddsSnapshot, Pick, PipelineError, Recommendation, RecommendationUpdate, StoredSnapshot,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS snapshots (
        id                TEXT PRIMARY KEY,
        collection        TEXT NOT NULL,
        captured_at       TEXT NOT NULL,
        event_id          TEXT NOT NULL,
        sport             TEXT NOT NULL,
        home_team         TEXT NOT NULL,
        away_team         TEXT NOT NULL,
        commence_time     TEXT NOT NULL,
        bookmaker         TEXT NOT NULL,
        home_moneyline    REAL,
        away_moneyline    REAL,
        home_spread_point REAL,
        home_spread_price REAL,
        total_point       REAL,
        total_over_price  REAL,
        total_under_price REAL,
        recommendation    TEXT,
        ai_outcome        TEXT,
        confidence        REAL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshots_event ON snapshots (collection, event_id)",
];

const INSERT_SQL: &str = r#"
    INSERT INTO snapshots (
        id, collection, captured_at, event_id, sport, home_team, away_team,
        commence_time, bookmaker, home_moneyline, away_moneyline,
        home_spread_point, home_spread_price, total_point,
        total_over_price, total_under_price
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const SELECT_ALL_SQL: &str = r#"
    SELECT id, captured_at, event_id, sport, home_team, away_team,
           commence_time, bookmaker, home_moneyline, away_moneyline,
           home_spread_point, home_spread_price, total_point,
           total_over_price, total_under_price,
           recommendation, ai_outcome, confidence
    FROM snapshots
    WHERE collection = ?
    ORDER BY rowid
"#;

const UPDATE_SQL: &str = r#"
    UPDATE snapshots
    SET recommendation = ?, ai_outcome = ?, confidence = ?
    WHERE id = ? AND collection = ?
"#;

fn format_instant(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_instant(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid {column} value in snapshots table: {raw}"))
}

/// Snapshot repository over a SQLite connection pool.
pub struct SqliteRepository {
    pool: SqlitePool,
    collection: String,
}

impl SqliteRepository {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str, collection: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {url}"))?;

        let repo = Self {
            pool,
            collection: collection.to_string(),
        };
        repo.migrate().await?;
        info!(url, collection, "Snapshot store ready");
        Ok(repo)
    }

    /// Private in-memory database. Pinned to one connection that never
    /// expires, since each SQLite memory connection is its own database.
    pub async fn in_memory(collection: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let repo = Self {
            pool,
            collection: collection.to_string(),
        };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA.iter().copied() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create snapshots schema")?;
        }
        Ok(())
    }

    fn row_to_snapshot(row: &SqliteRow) -> Result<StoredSnapshot> {
        let captured_at: String = row.try_get("captured_at")?;
        let commence_time: String = row.try_get("commence_time")?;

        let snapshot = OddsSnapshot {
            timestamp: parse_instant(&captured_at, "captured_at")?,
            event_id: row.try_get("event_id")?,
            sport: row.try_get("sport")?,
            home_team: row.try_get("home_team")?,
            away_team: row.try_get("away_team")?,
            commence_time: parse_instant(&commence_time, "commence_time")?,
            bookmaker: row.try_get("bookmaker")?,
            home_moneyline: row.try_get("home_moneyline")?,
            away_moneyline: row.try_get("away_moneyline")?,
            home_spread_point: row.try_get("home_spread_point")?,
            home_spread_price: row.try_get("home_spread_price")?,
            total_point: row.try_get("total_point")?,
            total_over_price: row.try_get("total_over_price")?,
            total_under_price: row.try_get("total_under_price")?,
        };

        let id: String = row.try_get("id")?;
        let reasoning: Option<String> = row.try_get("recommendation")?;
        let outcome: Option<String> = row.try_get("ai_outcome")?;
        let confidence: Option<f64> = row.try_get("confidence")?;

        let recommendation = match (reasoning, outcome, confidence) {
            (Some(reasoning), Some(label), Some(confidence)) => match label.parse::<Pick>() {
                Ok(outcome) => Some(Recommendation {
                    reasoning,
                    outcome,
                    confidence,
                }),
                Err(e) => {
                    warn!(id = %id, error = %e, "Ignoring unreadable stored recommendation");
                    None
                }
            },
            _ => None,
        };

        Ok(StoredSnapshot {
            id,
            snapshot,
            recommendation,
        })
    }
}

#[async_trait]
impl SnapshotRepository for SqliteRepository {
    async fn insert_batch(&self, snapshots: &[OddsSnapshot]) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await.context("Failed to begin insert batch")?;
        let mut ids = Vec::with_capacity(snapshots.len());

        for s in snapshots {
            let id = Uuid::new_v4().to_string();
            sqlx::query(INSERT_SQL)
                .bind(&id)
                .bind(&self.collection)
                .bind(format_instant(s.timestamp))
                .bind(&s.event_id)
                .bind(&s.sport)
                .bind(&s.home_team)
                .bind(&s.away_team)
                .bind(format_instant(s.commence_time))
                .bind(&s.bookmaker)
                .bind(s.home_moneyline)
                .bind(s.away_moneyline)
                .bind(s.home_spread_point)
                .bind(s.home_spread_price)
                .bind(s.total_point)
                .bind(s.total_over_price)
                .bind(s.total_under_price)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert snapshot for event {}", s.event_id))?;
            ids.push(id);
        }

        tx.commit().await.context("Failed to commit insert batch")?;
        debug!(count = ids.len(), collection = %self.collection, "Snapshot batch committed");
        Ok(ids)
    }

    async fn load_all(&self) -> Result<Vec<StoredSnapshot>> {
        let mut rows = sqlx::query(SELECT_ALL_SQL)
            .bind(&self.collection)
            .fetch(&self.pool);

        let mut out = Vec::new();
        while let Some(row) = rows.try_next().await.context("Failed to read snapshots")? {
            out.push(Self::row_to_snapshot(&row)?);
        }
        debug!(count = out.len(), collection = %self.collection, "Snapshots loaded");
        Ok(out)
    }

    async fn apply_recommendations(&self, updates: &[RecommendationUpdate]) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("Failed to begin update batch")?;

        for update in updates {
            let rec = &update.recommendation;
            let result = sqlx::query(UPDATE_SQL)
                .bind(&rec.reasoning)
                .bind(rec.outcome.label())
                .bind(rec.confidence)
                .bind(&update.document_id)
                .bind(&self.collection)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to update document {}", update.document_id))?;

            if result.rows_affected() == 0 {
                // Dropping `tx` rolls back every update staged so far.
                return Err(PipelineError::Storage(format!(
                    "document not found: {}",
                    update.document_id
                ))
                .into());
            }
        }

        tx.commit().await.context("Failed to commit update batch")?;
        Ok(updates.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
