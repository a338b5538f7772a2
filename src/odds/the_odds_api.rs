//! The Odds API (v4) client.
//!
//! API docs: https://the-odds-api.com/liveapi/guides/v4/
//! Endpoint: `GET /v4/sports/{sport}/odds/`
//! Auth: `apiKey` query parameter. Quota usage is reported in the
//! `x-requests-remaining` / `x-requests-used` response headers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{FeedEvent, OddsFeed};
use crate::config::FeedConfig;
use crate::types::{MarketKind, PipelineError};

/// HTTP client for The Odds API.
pub struct TheOddsApiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    regions: String,
    odds_format: String,
}

impl TheOddsApiClient {
    pub fn new(config: &FeedConfig, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("sharpline/0.1.0")
            .build()
            .context("Failed to build HTTP client for odds feed")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            regions: config.regions.clone(),
            odds_format: config.odds_format.clone(),
        })
    }

    /// Full request URL for one sport, API key included.
    fn odds_url(&self, sport: &str) -> String {
        format!(
            "{}/{}/odds/?apiKey={}&regions={}&markets={}&oddsFormat={}",
            self.base_url,
            urlencoding::encode(sport),
            urlencoding::encode(self.api_key.expose_secret()),
            urlencoding::encode(&self.regions),
            MarketKind::feed_keys(),
            urlencoding::encode(&self.odds_format),
        )
    }
}

#[async_trait]
impl OddsFeed for TheOddsApiClient {
    async fn fetch_odds(&self, sport: &str) -> Result<Vec<FeedEvent>> {
        // The URL carries the API key: log the sport only.
        debug!(sport, "Fetching odds");

        let resp = self
            .http
            .get(self.odds_url(sport))
            .send()
            .await
            .map_err(|e| PipelineError::Feed {
                sport: sport.to_string(),
                message: format!("request failed: {}", e.without_url()),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Feed {
                sport: sport.to_string(),
                message: format!("HTTP {status}: {body}"),
            }
            .into());
        }

        if let Some(remaining) = resp
            .headers()
            .get("x-requests-remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!(sport, remaining, "Odds API quota");
        }

        let events: Vec<FeedEvent> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse odds response for {sport}"))?;

        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
