//! Pipeline configuration loaded from an optional YAML file.
//!
//! Every key is optional; anything left out falls back to the defaults below,
//! which reproduce the behaviour of the scheduled jobs.
//!
//! # Example
//!
//! ```yaml
//! digest:
//!   max_articles: 40
//!   categories:
//!     fallback: research
//!     entries:
//!       - name: research
//!         description: Scientific studies, clinical trials, lab discoveries
//!       - name: local
//!         description: New Jersey events and support groups
//! relator:
//!   lookback: 8
//! papers:
//!   history_cap: 60
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

/// Problems that stop a run before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential: set {0}")]
    MissingCredential(&'static str),
    #[error("failed to read config file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config file {} is not valid: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for all pipelines.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub digest: DigestConfig,
    pub relator: RelatorConfig,
    pub papers: PapersConfig,
    pub openings: OpeningsConfig,
}

impl Config {
    /// Load the YAML file at `path`, or the defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document means "all defaults".
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.digest.categories.validate()?;
        if self.digest.local_quota > self.digest.max_articles {
            return Err(ConfigError::Invalid(format!(
                "digest.local_quota ({}) exceeds digest.max_articles ({})",
                self.digest.local_quota, self.digest.max_articles
            )));
        }
        Ok(())
    }
}

/// One category the LLM may assign.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub name: String,
    pub description: String,
}

/// The fixed category set plus the category used when the model's answer is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategorySet {
    pub entries: Vec<Category>,
    pub fallback: String,
}

impl Default for CategorySet {
    fn default() -> Self {
        let entries = [
            ("research", "Scientific studies, clinical trials, lab discoveries"),
            ("treatment", "FDA approvals, therapies, symptom management"),
            ("cure", "Breakthrough potential, experimental approaches"),
            ("grants", "Funding opportunities, research grants"),
            ("assistance", "Patient support, caregiver resources, financial aid"),
            (
                "local",
                "New Jersey events, support groups, charities, volunteer opportunities",
            ),
        ]
        .into_iter()
        .map(|(name, description)| Category {
            name: name.to_string(),
            description: description.to_string(),
        })
        .collect();

        Self {
            entries,
            fallback: "research".to_string(),
        }
    }
}

impl CategorySet {
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|c| c.name == name)
    }

    /// Map a model-supplied category onto the set, falling back for unknown names.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        if self.contains(name) {
            name
        } else {
            &self.fallback
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.name.as_str())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::Invalid("category set is empty".to_string()));
        }
        if !self.contains(&self.fallback) {
            return Err(ConfigError::Invalid(format!(
                "fallback category '{}' is not in the category set",
                self.fallback
            )));
        }
        Ok(())
    }
}

/// Settings for the news digest pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub categories: CategorySet,
    /// How far back sources are searched.
    pub days_back: i64,
    /// Most records sent to the model in one run.
    pub max_articles: usize,
    /// Local records guaranteed a slot when the batch is over `max_articles`.
    pub local_quota: usize,
    /// Maximum digests kept; 0 keeps everything.
    pub history_cap: usize,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            categories: CategorySet::default(),
            days_back: 7,
            max_articles: 50,
            local_quota: 10,
            history_cap: 0,
            model: "claude-3-haiku-20240307".to_string(),
            max_tokens: 4000,
        }
    }
}

/// Parameters of the lexical relatedness heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelatorConfig {
    /// Number of most recent history entries scanned.
    pub lookback: usize,
    /// Maximum back-references attached to one article.
    pub max_related: usize,
    /// Shared non-stopword title words needed to call two articles related.
    pub min_overlap: usize,
    pub stopwords: Vec<String>,
}

impl Default for RelatorConfig {
    fn default() -> Self {
        Self {
            lookback: 12,
            max_related: 3,
            min_overlap: 3,
            stopwords: ["the", "a", "an", "in", "on", "for", "of", "to", "and", "als", "with"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Settings for the preprint selector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PapersConfig {
    pub queries: Vec<String>,
    pub max_results: usize,
    /// Maximum selections kept; 0 keeps everything.
    pub history_cap: usize,
    /// Pause between arXiv queries, in seconds.
    pub query_delay_secs: u64,
}

impl Default for PapersConfig {
    fn default() -> Self {
        Self {
            queries: vec![
                "cat:cs.AI OR cat:cs.LG OR cat:cs.CL OR cat:cs.CV".to_string(),
                "cat:cs.CR".to_string(),
                "all:cybersecurity OR all:adversarial OR all:security".to_string(),
            ],
            max_results: 20,
            history_cap: 30,
            query_delay_secs: 3,
        }
    }
}

/// Settings for the story page generator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpeningsConfig {
    /// Pages of each kind requested per run.
    pub per_run: usize,
    /// Maximum pages of each kind kept in the cache.
    pub max_cache: usize,
}

impl Default for OpeningsConfig {
    fn default() -> Self {
        Self {
            per_run: 5,
            max_cache: 50,
        }
    }
}
