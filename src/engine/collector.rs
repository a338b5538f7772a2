//! Ingestion collector.
//!
//! For each configured sport: fetch current odds, keep games starting no
//! later than the end of today (local calendar), normalise them against
//! the reference bookmaker and persist the sport's snapshots as one
//! atomic batch. Failures are isolated per sport.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::odds::normalizer::normalize;
use crate::odds::OddsFeed;
use crate::storage::SnapshotRepository;
use crate::types::PipelineError;

/// Last instant of `now`'s calendar day in its own time zone.
pub fn end_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let last_ms = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    let naive = now.date_naive().and_time(last_ms);
    match now.timezone().from_local_datetime(&naive).latest() {
        Some(local) => local.with_timezone(&Utc),
        // Nonexistent local time (DST gap at midnight): read it as UTC.
        None => naive.and_utc(),
    }
}

/// Counts for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub sports_attempted: usize,
    pub sports_failed: Vec<String>,
    pub events_received: usize,
    /// Games starting after the end of today.
    pub events_not_today: usize,
    /// Reference bookmaker missing or commence time unreadable.
    pub events_skipped: usize,
    pub snapshots_saved: usize,
}

impl IngestReport {
    fn absorb(&mut self, stats: &SportStats) {
        self.events_received += stats.received;
        self.events_not_today += stats.not_today;
        self.events_skipped += stats.skipped;
        self.snapshots_saved += stats.saved;
    }
}

#[derive(Debug, Default)]
struct SportStats {
    received: usize,
    not_today: usize,
    skipped: usize,
    saved: usize,
}

/// Polls the odds feed and appends snapshots to the repository.
pub struct IngestionCollector<'a> {
    feed: &'a dyn OddsFeed,
    repo: &'a dyn SnapshotRepository,
    sports: &'a [String],
    reference_bookmaker: &'a str,
    request_delay: Duration,
}

impl<'a> IngestionCollector<'a> {
    pub fn new(
        feed: &'a dyn OddsFeed,
        repo: &'a dyn SnapshotRepository,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            feed,
            repo,
            sports: &config.feed.sports,
            reference_bookmaker: &config.app.reference_bookmaker,
            request_delay: Duration::from_millis(config.feed.request_delay_ms),
        }
    }

    /// Run one ingestion pass using today's local calendar date.
    pub async fn run(&self) -> IngestReport {
        self.run_until(end_of_day(&Local::now())).await
    }

    /// Run one ingestion pass keeping games that start at or before `cutoff`.
    pub async fn run_until(&self, cutoff: DateTime<Utc>) -> IngestReport {
        info!(sports = self.sports.len(), cutoff = %cutoff, "Starting odds collection");
        let mut report = IngestReport::default();

        for (i, sport) in self.sports.iter().filter(|s| !s.trim().is_empty()).enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            report.sports_attempted += 1;

            match self.collect_sport(sport, cutoff).await {
                Ok(stats) => {
                    info!(
                        sport = %sport,
                        received = stats.received,
                        saved = stats.saved,
                        "Sport collected"
                    );
                    report.absorb(&stats);
                }
                Err(e) => {
                    match e.downcast_ref::<PipelineError>() {
                        Some(PipelineError::Feed { .. }) => {
                            warn!(sport = %sport, error = %e, "Odds fetch failed, skipping sport")
                        }
                        _ => {
                            error!(sport = %sport, error = format!("{e:#}"), "Unexpected failure, skipping sport")
                        }
                    }
                    report.sports_failed.push(sport.clone());
                }
            }
        }

        info!(
            attempted = report.sports_attempted,
            failed = report.sports_failed.len(),
            events = report.events_received,
            not_today = report.events_not_today,
            skipped = report.events_skipped,
            saved = report.snapshots_saved,
            "Odds collection complete"
        );
        report
    }

    async fn collect_sport(&self, sport: &str, cutoff: DateTime<Utc>) -> Result<SportStats> {
        debug!(sport, "Fetching odds");
        let events = self.feed.fetch_odds(sport).await?;
        let captured_at = Utc::now();

        let mut stats = SportStats {
            received: events.len(),
            ..SportStats::default()
        };
        let mut staged = Vec::with_capacity(events.len());

        for event in &events {
            // Unparsable times fall through to the normaliser, which skips them.
            if event.commence_at().is_some_and(|t| t > cutoff) {
                stats.not_today += 1;
                continue;
            }
            match normalize(event, self.reference_bookmaker, captured_at) {
                Some(snapshot) => staged.push(snapshot),
                None => stats.skipped += 1,
            }
        }

        if staged.is_empty() {
            debug!(sport, "Nothing to save");
            return Ok(stats);
        }

        let ids = self
            .repo
            .insert_batch(&staged)
            .await
            .with_context(|| format!("Failed to save snapshot batch for {sport}"))?;
        stats.saved = ids.len();
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
