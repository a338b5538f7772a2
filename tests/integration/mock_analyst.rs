//! Scripted analyst for integration testing.
//!
//! Answers with a canned reply per event id, routed through the same
//! reply parser the real providers use, and records every request.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use sharpline::llm::{parse_recommendation, AnalysisRequest, LineAnalyst};
use sharpline::types::Recommendation;

#[derive(Default)]
pub struct ScriptedAnalyst {
    replies: HashMap<String, String>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl ScriptedAnalyst {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw reply text returned for `event_id`.
    pub fn reply(mut self, event_id: &str, text: &str) -> Self {
        self.replies.insert(event_id.to_string(), text.to_string());
        self
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LineAnalyst for ScriptedAnalyst {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Recommendation> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("analyst lock poisoned"))?
            .push(request.clone());

        let text = self
            .replies
            .get(&request.event_id)
            .ok_or_else(|| anyhow!("analysis service timed out"))?;
        parse_recommendation(text, request)
    }
}
