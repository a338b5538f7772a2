//! Anthropic Claude integration.
//!
//! Implements `LineAnalyst` using the Anthropic Messages API. One
//! request per game; the system role goes in the top-level `system`
//! field. Tracks cumulative cost for the end-of-run summary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::{parse_recommendation, AnalysisRequest, LineAnalyst};
use crate::types::{PipelineError, Recommendation};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Approximate cost per 1K input tokens (Sonnet).
const INPUT_COST_PER_1K: f64 = 0.003;
/// Approximate cost per 1K output tokens (Sonnet).
const OUTPUT_COST_PER_1K: f64 = 0.015;

/// Messages API model id. Router-style ids ("vendor/model") are not
/// accepted by this API, so they fall back to the default.
fn resolve_model(model: Option<String>) -> String {
    match model {
        Some(m) if !m.trim().is_empty() && !m.contains('/') => m,
        Some(m) => {
            warn!(model = %m, default = DEFAULT_MODEL, "Model id not usable with Anthropic API, using default");
            DEFAULT_MODEL.to_string()
        }
        None => DEFAULT_MODEL.to_string(),
    }
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnthropicClient {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    total_cost: AtomicU64, // stored as cost * 1_000_000
    total_calls: AtomicU64,
}

impl AnthropicClient {
    pub fn new(
        api_key: SecretString,
        model: Option<String>,
        max_tokens: Option<u32>,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(
                timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ))
            .build()
            .context("Failed to build Anthropic HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: resolve_model(model),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            total_cost: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
        })
    }

    /// Send one messages request. Returns the reply text and its cost.
    async fn call_api(&self, system: &str, user_message: &str) -> Result<(String, f64)> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: user_message,
            }],
        };

        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error {status}: {error_text}");
        }

        let body: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;

        let text = body
            .content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let usage = body.usage.unwrap_or_default();
        let cost = (usage.input_tokens as f64 / 1000.0) * INPUT_COST_PER_1K
            + (usage.output_tokens as f64 / 1000.0) * OUTPUT_COST_PER_1K;

        self.total_cost
            .fetch_add((cost * 1_000_000.0) as u64, Ordering::Relaxed);
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        Ok((text, cost))
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Total cumulative cost across all calls.
    pub fn cumulative_cost(&self) -> f64 {
        self.total_cost.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    /// Total number of successful API calls.
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LineAnalyst for AnthropicClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Recommendation> {
        debug!(event_id = %request.event_id, model = %self.model, "Requesting line analysis");

        let (text, cost) = self
            .call_api(&request.system_prompt, &request.query)
            .await
            .map_err(|e| PipelineError::Analysis {
                event_id: request.event_id.clone(),
                message: format!("{e:#}"),
            })?;

        let recommendation = parse_recommendation(&text, request)
            .with_context(|| format!("Malformed analysis for {}", request.event_id))?;

        info!(
            event_id = %request.event_id,
            outcome = %recommendation.outcome,
            confidence = format!("{:.0}%", recommendation.confidence * 100.0),
            cost = format!("${:.4}", cost),
            "Analysis complete"
        );
        Ok(recommendation)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
