//! OpenAI Chat Completions client.

use super::{http_client, AdapterError, AskAsync};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, warn};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI chat models.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    http: reqwest::Client,
}

impl fmt::Debug for OpenAi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAi")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 500,
            temperature: None,
            http: http_client(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

impl AskAsync for OpenAi {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, prompt: &str) -> Result<String, AdapterError> {
        let response = self
            .http
            .post(format!("{OPENAI_API_URL}/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "OpenAI API call failed");
            return Err(AdapterError::Status {
                provider: "openai",
                status,
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&response.text().await?)?;
        debug!(choices = parsed.choices.len(), "OpenAI responded");
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(AdapterError::Empty("openai"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let ai = OpenAi::new("sk-test", DEFAULT_MODEL)
            .with_max_tokens(500)
            .with_temperature(0.8);
        let value = serde_json::to_value(ai.request("Write a page")).unwrap();
        assert_eq!(value["model"], "gpt-3.5-turbo");
        assert_eq!(value["max_tokens"], 500);
        assert_eq!(value["messages"][0]["content"], "Write a page");
        assert!((value["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": " The ship woke. "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some(" The ship woke. ")
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let ai = OpenAi::new("sk-secret", DEFAULT_MODEL);
        assert!(!format!("{ai:?}").contains("sk-secret"));
    }
}
