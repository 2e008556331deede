//! Utility functions for text cleanup, LLM response handling, dates and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Character-safe truncation for logging and stored descriptions
//! - HTML stripping for feed summaries
//! - Extraction of JSON bodies from fenced model responses
//! - JSON error detection for handling LLM response truncation
//! - File system validation for the data directory

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument, warn};

/// User-Agent sent to every content source.
pub const USER_AGENT: &str = concat!("research_digest/", env!("CARGO_PKG_VERSION"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Today's local date as `YYYY-MM-DD`, the idempotence stamp for histories.
pub fn local_date_stamp() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Current UTC time in ISO 8601 without offset.
pub fn utc_timestamp() -> String {
    Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Build an HTTP client with a per-request timeout.
///
/// Falls back to reqwest's defaults if the TLS backend cannot be configured
/// with the requested options.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build HTTP client; using defaults");
            reqwest::Client::new()
        })
}

/// Keep at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the LLM response is cut off by its token limit, the JSON fails with an
/// EOF error. Such responses are worth asking for again.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Pull the JSON body out of a model response.
///
/// A ```` ```json ```` fence wins; otherwise the first plain ```` ``` ```` fence;
/// otherwise the whole response. The result is trimmed.
pub fn extract_json_block(response: &str) -> &str {
    let body = if let Some((_, rest)) = response.split_once("```json") {
        rest.split("```").next().unwrap_or(rest)
    } else if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response)
    } else {
        response
    };
    body.trim()
}

/// Strip tags from an HTML fragment and collapse whitespace.
pub fn clean_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(text);
    let plain = fragment.root_element().text().collect::<Vec<_>>().join("");
    WHITESPACE.replace_all(&plain, " ").trim().to_string()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then writes and removes a probe
/// file. Called before any network activity so a bad data path fails fast.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Data directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
