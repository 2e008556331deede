//! Anthropic Messages API client.

use super::{http_client, AdapterError, AskAsync};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, instrument, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Small, inexpensive model used for summarization and generation.
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

impl MessagesResponse {
    fn text(self) -> Option<String> {
        self.content.into_iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.trim().to_string()),
            ContentBlock::Other => None,
        })
    }
}

/// Client for Claude models.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
    http: reqwest::Client,
}

impl fmt::Debug for Claude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claude")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 4096,
            base_url: ANTHROPIC_API_URL.to_string(),
            http: http_client(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap, AdapterError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn request(&self, prompt: &str) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
        }
    }
}

impl AskAsync for Claude {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, prompt: &str) -> Result<String, AdapterError> {
        let t0 = Instant::now();
        let url = format!("{}/messages", self.base_url);
        debug!(prompt_chars = prompt.len(), "Claude messages request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&self.request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, elapsed_ms = t0.elapsed().as_millis(), "Claude API call failed");
            return Err(AdapterError::Status {
                provider: "anthropic",
                status,
                body,
            });
        }

        let body = response.text().await?;
        let parsed: MessagesResponse = serde_json::from_str(&body)?;
        debug!(elapsed_ms = t0.elapsed().as_millis(), "Claude responded");
        parsed
            .text()
            .filter(|t| !t.is_empty())
            .ok_or(AdapterError::Empty("anthropic"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claude_new() {
        let ai = Claude::new("sk-ant-test", DEFAULT_MODEL).with_max_tokens(600);
        assert_eq!(ai.model(), DEFAULT_MODEL);
        assert_eq!(ai.max_tokens, 600);
        assert!(!format!("{ai:?}").contains("sk-ant-test"));
    }

    #[test]
    fn test_request_shape() {
        let ai = Claude::new("k", "claude-test").with_max_tokens(4000);
        let value = serde_json::to_value(ai.request("Summarize")).unwrap();
        assert_eq!(value["model"], "claude-test");
        assert_eq!(value["max_tokens"], 4000);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "Summarize");
    }

    #[test]
    fn test_response_first_text_block() {
        let raw = r#"{
            "id": "msg_1",
            "content": [
                {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                {"type": "text", "text": "  {\"articles\": []}  "}
            ]
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("{\"articles\": []}"));
    }

    #[test]
    fn test_response_without_text() {
        let parsed: MessagesResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(parsed.text().is_none());
    }
}
