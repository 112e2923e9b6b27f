use serde::{Deserialize, Serialize};

/// Request body for one query against the upstream agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub prompt: String,
    pub model: String,
    pub max_turns: u32,
    pub max_budget_usd: f64,
    #[serde(default)]
    pub enable_thinking: bool,
    /// Session to continue; absent starts a fresh upstream session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<String>,
}

impl QueryRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_turns: 25,
            max_budget_usd: 1.0,
            enable_thinking: false,
            resume: None,
        }
    }

    pub fn with_limits(mut self, max_turns: u32, max_budget_usd: f64) -> Self {
        self.max_turns = max_turns;
        self.max_budget_usd = max_budget_usd;
        self
    }

    pub fn with_thinking(mut self, enable_thinking: bool) -> Self {
        self.enable_thinking = enable_thinking;
        self
    }

    pub fn with_resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume = Some(session_id.into());
        self
    }
}
