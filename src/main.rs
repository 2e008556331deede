//! # research_digest
//!
//! Three small batch pipelines that share one incremental JSON store:
//!
//! - **digest**: polls NewsAPI, PubMed and RSS feeds for ALS news, has Claude
//!   categorize and summarize the batch, relates it to earlier digests and
//!   prepends one digest to `digests.json`
//! - **papers**: polls arXiv, scores papers lexically and prepends the day's
//!   pick to a capped `papers.json`
//! - **openings**: asks an LLM for science fiction opening and ending pages and
//!   keeps a bounded cache in `openings.json`
//!
//! ## Usage
//!
//! ```sh
//! ANTHROPIC_API_KEY=... research_digest --data-dir ./data digest
//! research_digest papers
//! HF_TOKEN=... research_digest openings
//! ```
//!
//! ## Architecture
//!
//! Every run is one sequential pass:
//! 1. **Load**: read the full prior history (missing file = empty, corrupt file = fatal)
//! 2. **Guard**: stop if the newest entry is already stamped today
//! 3. **Fetch**: query every source; failed sources are logged and skipped
//! 4. **Process**: dedupe, then the optional LLM step with a deterministic fallback
//! 5. **Merge and write**: prepend (or append and trim), then write via temp file + rename

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod llm;
mod models;
mod pipelines;
mod sources;
mod store;
mod utils;

use cli::{Cli, Command, DigestArgs, OpeningsArgs, PapersArgs};
use config::{Config, ConfigError};
use llm::{Claude, LlmClient, RetryAsk};
use pipelines::digest::DigestPipeline;
use pipelines::openings::OpeningsPipeline;
use pipelines::papers::PapersPipeline;
use pipelines::RunOutcome;
use sources::arxiv::ArxivClient;
use sources::NewsSources;
use store::{JsonFile, MergePolicy, Relator};
use utils::{ensure_writable_dir, local_date_stamp};

/// First retry delay; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Token budget for one generated story page.
const PAGE_MAX_TOKENS: u32 = 600;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("research_digest starting up");

    let args = Cli::parse();
    debug!(data_dir = %args.data_dir.display(), config = ?args.config, "Parsed CLI arguments");

    let config = Config::load(args.config.as_deref()).await?;

    let outcome = match args.command {
        Command::Digest(digest_args) => {
            run_digest(&args.data_dir, args.llm_retries, digest_args, config).await?
        }
        Command::Papers(papers_args) => run_papers(&args.data_dir, papers_args, config).await?,
        Command::Openings(openings_args) => {
            run_openings(&args.data_dir, args.llm_retries, openings_args, config).await?
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?outcome,
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[instrument(level = "info", skip_all)]
async fn run_digest(
    data_dir: &Path,
    retries: usize,
    args: DigestArgs,
    mut config: Config,
) -> Result<RunOutcome, Box<dyn Error>> {
    let api_key = non_empty(args.anthropic_api_key)
        .ok_or(ConfigError::MissingCredential("ANTHROPIC_API_KEY"))?;

    if let Some(cap) = args.history_cap {
        config.digest.history_cap = cap;
    }
    if let Some(model) = args.model {
        config.digest.model = model;
    }
    if let Some(days) = args.days_back {
        config.digest.days_back = days;
    }
    config.validate()?;

    ensure_writable_dir(data_dir).await?;

    let claude = Claude::new(api_key, config.digest.model.as_str())
        .with_max_tokens(config.digest.max_tokens);
    info!(model = claude.model(), "Using Claude for categorization");
    let llm = RetryAsk::new(claude, retries, RETRY_BASE_DELAY);
    let sources = NewsSources::new(non_empty(args.newsapi_key), config.digest.days_back);

    let pipeline = DigestPipeline {
        store: JsonFile::new(data_dir.join("digests.json")),
        llm: &llm,
        config: &config.digest,
        relator: Relator::new(&config.relator),
        policy: MergePolicy::from_cap(config.digest.history_cap),
    };
    Ok(pipeline
        .run(async || sources.fetch_all().await, Local::now().naive_local())
        .await?)
}

#[instrument(level = "info", skip_all)]
async fn run_papers(
    data_dir: &Path,
    args: PapersArgs,
    config: Config,
) -> Result<RunOutcome, Box<dyn Error>> {
    ensure_writable_dir(data_dir).await?;

    let cap = args.history_cap.unwrap_or(config.papers.history_cap);
    let client = ArxivClient::new(config.papers.max_results);
    let delay = Duration::from_secs(config.papers.query_delay_secs);

    let pipeline = PapersPipeline {
        store: JsonFile::new(data_dir.join("papers.json")),
        policy: MergePolicy::from_cap(cap),
    };
    Ok(pipeline
        .run(
            async || client.fetch_all(&config.papers.queries, delay).await,
            &local_date_stamp(),
            &mut rand::rng(),
        )
        .await?)
}

#[instrument(level = "info", skip_all)]
async fn run_openings(
    data_dir: &Path,
    retries: usize,
    args: OpeningsArgs,
    mut config: Config,
) -> Result<RunOutcome, Box<dyn Error>> {
    let client = LlmClient::from_credentials(&args.credentials(), PAGE_MAX_TOKENS)?;
    info!(provider = client.provider(), "Using LLM provider");

    if let Some(count) = args.count {
        config.openings.per_run = count;
    }

    ensure_writable_dir(data_dir).await?;

    let llm = RetryAsk::new(client, retries, RETRY_BASE_DELAY);
    let pipeline = OpeningsPipeline {
        store: JsonFile::new(data_dir.join("openings.json")),
        llm: &llm,
        config: &config.openings,
    };
    Ok(pipeline.run(&mut rand::rng()).await?)
}
