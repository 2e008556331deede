//! Hugging Face Inference API client for text-generation models.

use super::{http_client, AdapterError, AskAsync};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, warn};

const HF_API_URL: &str = "https://api-inference.huggingface.co/models";

pub const DEFAULT_MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";

#[derive(Debug, Serialize)]
struct Parameters {
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: Parameters,
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    generated_text: String,
}

/// The endpoint answers with a list of generations, or an object on errors.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    List(Vec<Generation>),
    Other(serde_json::Value),
}

impl GenerationResponse {
    fn text(self) -> Option<String> {
        match self {
            GenerationResponse::List(list) => list
                .into_iter()
                .next()
                .map(|g| g.generated_text.trim().to_string()),
            GenerationResponse::Other(_) => None,
        }
    }
}

/// Client for hosted text-generation models.
#[derive(Clone)]
pub struct HuggingFace {
    api_token: String,
    model: String,
    max_new_tokens: u32,
    http: reqwest::Client,
}

impl fmt::Debug for HuggingFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuggingFace")
            .field("model", &self.model)
            .field("max_new_tokens", &self.max_new_tokens)
            .finish()
    }
}

impl HuggingFace {
    pub fn new(api_token: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            model: model.into(),
            max_new_tokens: 500,
            http: http_client(),
        }
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    fn request<'a>(&self, prompt: &'a str) -> GenerationRequest<'a> {
        GenerationRequest {
            inputs: prompt,
            parameters: Parameters {
                max_new_tokens: self.max_new_tokens,
                temperature: 0.8,
                top_p: 0.95,
                do_sample: true,
                return_full_text: false,
            },
        }
    }
}

impl AskAsync for HuggingFace {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, prompt: &str) -> Result<String, AdapterError> {
        let response = self
            .http
            .post(format!("{HF_API_URL}/{}", self.model))
            .bearer_auth(&self.api_token)
            .json(&self.request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Hugging Face API call failed");
            return Err(AdapterError::Status {
                provider: "huggingface",
                status,
                body,
            });
        }

        let parsed: GenerationResponse = serde_json::from_str(&response.text().await?)?;
        debug!("Hugging Face responded");
        parsed
            .text()
            .filter(|t| !t.is_empty())
            .ok_or(AdapterError::Empty("huggingface"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parameters() {
        let hf = HuggingFace::new("hf_token", DEFAULT_MODEL);
        let value = serde_json::to_value(hf.request("Once")).unwrap();
        assert_eq!(value["inputs"], "Once");
        assert_eq!(value["parameters"]["max_new_tokens"], 500);
        assert_eq!(value["parameters"]["do_sample"], true);
        assert_eq!(value["parameters"]["return_full_text"], false);
    }

    #[test]
    fn test_list_response() {
        let parsed: GenerationResponse =
            serde_json::from_str(r#"[{"generated_text": "  Dust settled.  "}]"#).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("Dust settled."));
    }

    #[test]
    fn test_error_object_has_no_text() {
        let parsed: GenerationResponse =
            serde_json::from_str(r#"{"error": "Model is loading"}"#).unwrap();
        assert!(parsed.text().is_none());
    }
}
