use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::GroupingError;
use crate::group::SemanticGrouper;
use crate::plan::{Command, Step};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = r#"You group sequences of Selenium commands into logical test steps.

Return ONLY a JSON array. Each element is {"name": "...", "commands": ["..."]}.
- Copy every command verbatim, in the original order. Do not add, drop or reorder commands.
- Every step has at least one command.
- Name each step after what it achieves, e.g. "Search for 'nba'"."#;

/// Asks an OpenAI-compatible chat completions endpoint to group commands.
pub struct OpenAiGrouper {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiGrouper {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SemanticGrouper for OpenAiGrouper {
    async fn propose(&self, commands: &[Command]) -> Result<Vec<Step>, GroupingError> {
        let listing = serde_json::to_string(commands)?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": format!("Group these Selenium commands into logical steps: {}", listing)},
                ],
                "temperature": 0.2,
            }))
            .send()
            .await
            .map_err(|e| GroupingError::Transport(e.to_string()))?;

        let status = response.status();
        let json_resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GroupingError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = json_resp["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error")
                .to_string();
            return Err(GroupingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let content = json_resp["choices"][0]["message"]["content"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or(GroupingError::EmptyResponse)?;

        debug!("[Brain] LLM says: {}", content);

        Ok(serde_json::from_str(strip_fences(content))?)
    }
}

/// Models like to wrap JSON in markdown fences even when told not to.
fn strip_fences(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
