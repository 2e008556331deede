//! Command-line interface definitions for research_digest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials are read from environment variables; every other option can
//! also come from the YAML config file, with flags taking precedence.

use crate::llm::Credentials;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the research_digest application.
///
/// # Examples
///
/// ```sh
/// # Weekly ALS news digest
/// ANTHROPIC_API_KEY=... research_digest digest
///
/// # Daily paper pick, keeping 60 days
/// research_digest --data-dir ./site/data papers --history-cap 60
///
/// # Top up the story page cache
/// HF_TOKEN=... research_digest openings --count 3
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding digests.json, papers.json and openings.json
    #[arg(short, long, env = "RESEARCH_DIGEST_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Optional path to a config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Extra attempts for each failed LLM call (0 = single attempt)
    #[arg(long, default_value_t = 0, global = true)]
    pub llm_retries: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Aggregate and categorize recent ALS news into a new digest
    Digest(DigestArgs),
    /// Select today's arXiv paper
    Papers(PapersArgs),
    /// Generate science fiction opening and ending pages
    Openings(OpeningsArgs),
}

#[derive(Args, Debug)]
pub struct DigestArgs {
    /// Anthropic API key (required)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// NewsAPI key; the NewsAPI source is skipped without it
    #[arg(long, env = "NEWSAPI_KEY", hide_env_values = true)]
    pub newsapi_key: Option<String>,

    /// Maximum digests kept (0 = keep all)
    #[arg(long)]
    pub history_cap: Option<usize>,

    /// Claude model used for categorization
    #[arg(long)]
    pub model: Option<String>,

    /// How many days back sources are searched
    #[arg(long)]
    pub days_back: Option<i64>,
}

#[derive(Args, Debug)]
pub struct PapersArgs {
    /// Maximum selections kept (0 = keep all)
    #[arg(long)]
    pub history_cap: Option<usize>,
}

#[derive(Args, Debug)]
pub struct OpeningsArgs {
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Alternative name for the Hugging Face token
    #[arg(long, env = "HUGGINGFACE_TOKEN", hide_env_values = true)]
    pub huggingface_token: Option<String>,

    /// Pages of each kind to generate
    #[arg(long)]
    pub count: Option<usize>,
}

impl OpeningsArgs {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            anthropic: self.anthropic_api_key.clone(),
            openai: self.openai_api_key.clone(),
            huggingface: self
                .hf_token
                .clone()
                .filter(|t| !t.trim().is_empty())
                .or_else(|| self.huggingface_token.clone()),
        }
    }
}
