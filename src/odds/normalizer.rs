//! Feed event → `OddsSnapshot` normalisation.
//!
//! Pure transform: picks the reference bookmaker, pulls moneyline,
//! spread and total quotes keyed by outcome name, and coerces every
//! number. Events without the reference bookmaker produce nothing.

use chrono::{DateTime, Utc};
use tracing::warn;

use super::coerce::number_or_none;
use super::{FeedBookmaker, FeedEvent};
use crate::types::{MarketKind, OddsSnapshot};

const OVER: &str = "Over";
const UNDER: &str = "Under";

/// Which number of an outcome to read.
#[derive(Clone, Copy)]
enum Field {
    Price,
    Point,
}

/// Look up one coerced value: first outcome named `name` in the first
/// market of kind `market`.
fn quote(bookmaker: &FeedBookmaker, market: MarketKind, name: &str, field: Field) -> Option<f64> {
    let outcome = bookmaker
        .outcomes(market.feed_key())
        .iter()
        .find(|o| o.name == name)?;
    match field {
        Field::Price => number_or_none(&outcome.price),
        Field::Point => number_or_none(&outcome.point),
    }
}

/// Build a snapshot from one feed event as quoted by `reference_bookmaker`.
///
/// Returns `None` when the bookmaker is absent (intentional filtering)
/// or the commence time is unreadable.
pub fn normalize(
    event: &FeedEvent,
    reference_bookmaker: &str,
    captured_at: DateTime<Utc>,
) -> Option<OddsSnapshot> {
    let bookmaker = event.bookmaker(reference_bookmaker)?;

    let Some(commence_time) = event.commence_at() else {
        warn!(
            event_id = %event.id,
            commence_time = %event.commence_time,
            "Unparsable commence time, skipping event"
        );
        return None;
    };

    let home = event.home_team.as_str();
    let away = event.away_team.as_str();

    Some(OddsSnapshot {
        timestamp: captured_at,
        event_id: event.id.clone(),
        sport: event.sport_title.clone(),
        home_team: event.home_team.clone(),
        away_team: event.away_team.clone(),
        commence_time,
        bookmaker: bookmaker.title.clone(),
        home_moneyline: quote(bookmaker, MarketKind::Moneyline, home, Field::Price),
        away_moneyline: quote(bookmaker, MarketKind::Moneyline, away, Field::Price),
        home_spread_point: quote(bookmaker, MarketKind::Spread, home, Field::Point),
        home_spread_price: quote(bookmaker, MarketKind::Spread, home, Field::Price),
        total_point: quote(bookmaker, MarketKind::Total, OVER, Field::Point),
        total_over_price: quote(bookmaker, MarketKind::Total, OVER, Field::Price),
        total_under_price: quote(bookmaker, MarketKind::Total, UNDER, Field::Price),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
