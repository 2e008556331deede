//! LLM interaction: provider clients behind one async trait, with optional retry.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`Claude`], [`OpenAi`], [`HuggingFace`]: HTTP clients for each provider
//! - [`LlmClient`]: Runtime choice between the providers
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//!
//! Every call returns `Result<_, AdapterError>`. Callers decide what a failure
//! means; the digest pipeline, for one, substitutes a deterministic fallback.
//!
//! # Retry Strategy
//!
//! Retries are off unless asked for (`--llm-retries`). When enabled:
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

pub mod claude;
pub mod huggingface;
pub mod openai;

pub use claude::Claude;
pub use huggingface::HuggingFace;
pub use openai::OpenAi;

use crate::config::ConfigError;
use rand::{rng, Rng};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Timeout applied to every LLM HTTP call.
pub const LLM_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// Why an LLM call produced nothing usable.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} API error ({status}): {body}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{0} returned no text")]
    Empty(&'static str),
    #[error("invalid credential header: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("response did not match the expected JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Trait for async LLM interaction.
///
/// Implementors send a prompt to a model and return its response. This
/// abstraction allows different backends, decorators, and test doubles.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send a prompt to the LLM and receive a response.
    async fn ask(&self, prompt: &str) -> Result<Self::Response, AdapterError>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// # Backoff Strategy
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper. `max_retries = 0` makes a single attempt.
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, prompt: &str) -> Result<Self::Response, AdapterError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(prompt).await {
                Ok(resp) => {
                    info!(
                        attempts = attempt + 1,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        "ask() succeeded"
                    );
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let shift = (attempt - 1).min(16) as u32;
                    let mut delay = self.base_delay.saturating_mul(1 << shift);
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// API credentials read from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub huggingface: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("anthropic", &self.anthropic.is_some())
            .field("openai", &self.openai.is_some())
            .field("huggingface", &self.huggingface.is_some())
            .finish()
    }
}

/// The provider chosen for a run.
#[derive(Debug)]
pub enum LlmClient {
    Claude(Claude),
    OpenAi(OpenAi),
    HuggingFace(HuggingFace),
}

impl LlmClient {
    /// Pick the first provider with a credential: Anthropic, then OpenAI, then HuggingFace.
    pub fn from_credentials(credentials: &Credentials, max_tokens: u32) -> Result<Self, ConfigError> {
        let non_empty = |key: &Option<String>| key.clone().filter(|k| !k.trim().is_empty());

        if let Some(key) = non_empty(&credentials.anthropic) {
            return Ok(Self::Claude(
                Claude::new(key, claude::DEFAULT_MODEL).with_max_tokens(max_tokens),
            ));
        }
        if let Some(key) = non_empty(&credentials.openai) {
            return Ok(Self::OpenAi(
                OpenAi::new(key, openai::DEFAULT_MODEL)
                    .with_max_tokens(max_tokens)
                    .with_temperature(0.8),
            ));
        }
        if let Some(key) = non_empty(&credentials.huggingface) {
            return Ok(Self::HuggingFace(
                HuggingFace::new(key, huggingface::DEFAULT_MODEL).with_max_new_tokens(max_tokens),
            ));
        }
        Err(ConfigError::MissingCredential(
            "one of ANTHROPIC_API_KEY, OPENAI_API_KEY, or HF_TOKEN",
        ))
    }

    pub fn provider(&self) -> &'static str {
        match self {
            LlmClient::Claude(_) => "anthropic",
            LlmClient::OpenAi(_) => "openai",
            LlmClient::HuggingFace(_) => "huggingface",
        }
    }
}

impl AskAsync for LlmClient {
    type Response = String;

    async fn ask(&self, prompt: &str) -> Result<String, AdapterError> {
        match self {
            LlmClient::Claude(c) => c.ask(prompt).await,
            LlmClient::OpenAi(c) => c.ask(prompt).await,
            LlmClient::HuggingFace(c) => c.ask(prompt).await,
        }
    }
}

/// HTTP client shared by the provider clients.
pub(crate) fn http_client() -> reqwest::Client {
    crate::utils::http_client(LLM_TIMEOUT)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedLlm;
    use super::*;

    #[tokio::test]
    async fn test_retry_recovers_after_failure() {
        let inner = ScriptedLlm::new(vec![Err("boom"), Ok("hello".to_string())]);
        let api = RetryAsk::new(inner, 2, StdDuration::from_millis(1));

        let resp = api.ask("prompt").await.unwrap();
        assert_eq!(resp, "hello");
        assert_eq!(api.inner().calls.get(), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_makes_one_attempt() {
        let api = RetryAsk::new(ScriptedLlm::failing(), 0, StdDuration::from_millis(1));

        let err = api.ask("prompt").await.unwrap_err();
        assert!(matches!(err, AdapterError::Empty(_)));
        assert_eq!(api.inner().calls.get(), 1);
    }

    #[test]
    fn test_provider_priority() {
        let all = Credentials {
            anthropic: Some("sk-ant".to_string()),
            openai: Some("sk-oai".to_string()),
            huggingface: Some("hf".to_string()),
        };
        assert_eq!(LlmClient::from_credentials(&all, 600).unwrap().provider(), "anthropic");

        let hf_only = Credentials {
            anthropic: Some("   ".to_string()),
            huggingface: Some("hf".to_string()),
            ..Default::default()
        };
        assert_eq!(
            LlmClient::from_credentials(&hf_only, 600).unwrap().provider(),
            "huggingface"
        );
    }

    #[test]
    fn test_no_credentials_is_config_error() {
        let err = LlmClient::from_credentials(&Credentials::default(), 600).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(_)));
    }

    #[test]
    fn test_credentials_debug_hides_keys() {
        let creds = Credentials {
            anthropic: Some("sk-ant-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("secret"));
    }
}
