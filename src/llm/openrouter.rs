//! OpenRouter LLM integration.
//!
//! Routes analysis calls through OpenRouter's unified API, giving access
//! to multiple model providers with a single API key. Uses the
//! OpenAI-compatible chat completions format.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::{parse_recommendation, AnalysisRequest, LineAnalyst};
use crate::types::{PipelineError, Recommendation};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Returns (input_cost_per_1k, output_cost_per_1k) for known models.
fn model_costs(model: &str) -> (f64, f64) {
    match model {
        m if m.contains("claude") && m.contains("sonnet") => (0.003, 0.015),
        m if m.contains("claude") && m.contains("opus") => (0.015, 0.075),
        m if m.contains("claude") && m.contains("haiku") => (0.0008, 0.004),
        m if m.contains("grok") => (0.003, 0.015),
        m if m.contains("gpt-4o") => (0.005, 0.015),
        // Conservative default
        _ => (0.005, 0.015),
    }
}

// ---------------------------------------------------------------------------
// API types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatResponse {
    fn text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenRouterClient {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    total_cost: AtomicU64, // stored as cost * 1_000_000
    total_calls: AtomicU64,
}

impl OpenRouterClient {
    /// Create a new OpenRouter client.
    ///
    /// - `api_key`: OpenRouter API key.
    /// - `model`: Model ID (e.g. "anthropic/claude-sonnet-4").
    /// - `max_tokens`: Max output tokens per request.
    /// - `timeout_secs`: Bound on each request.
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
            .context("Failed to build OpenRouter HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            total_cost: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
        })
    }

    /// Send one chat completion. Returns the reply text and its cost.
    async fn call_api(&self, system: &str, user_message: &str) -> Result<(String, f64)> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user_message },
            ],
        };

        let response = self
            .http
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .header("X-Title", "sharpline")
            .json(&request)
            .send()
            .await
            .context("OpenRouter request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter API error {status}: {error_text}");
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenRouter response")?;

        let usage = body.usage.as_ref().map(|u| (u.prompt_tokens, u.completion_tokens));
        let (input, output) = usage.unwrap_or((0, 0));
        let (in_rate, out_rate) = model_costs(&self.model);
        let cost = (input as f64 / 1000.0) * in_rate + (output as f64 / 1000.0) * out_rate;

        self.total_cost
            .fetch_add((cost * 1_000_000.0) as u64, Ordering::Relaxed);
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        Ok((body.text(), cost))
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn cumulative_cost(&self) -> f64 {
        self.total_cost.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LineAnalyst for OpenRouterClient {
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
