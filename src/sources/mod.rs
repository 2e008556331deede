//! Content source adapters that turn external APIs into normalized records.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | NewsAPI | [`newsapi`] | JSON search API | Requires `NEWSAPI_KEY`; general and local queries |
//! | PubMed | [`pubmed`] | E-utilities esearch + efetch | JSON id search, XML details |
//! | RSS/Atom | [`rss`] | Feed parsing | Dedicated feeds plus Google News search feeds |
//! | arXiv | [`arxiv`] | Atom API | Produces [`Paper`](crate::models::Paper)s, not records |
//!
//! # Failure Handling
//!
//! A source that fails (network error, bad status, unparsable payload) is
//! logged and contributes nothing; the remaining sources still run.

pub mod arxiv;
pub mod newsapi;
pub mod pubmed;
pub mod rss;

use crate::models::Record;
use std::time::Duration;
use tracing::{info, instrument};

/// Timeout for search and feed requests.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for bulk detail downloads (PubMed efetch).
pub const BULK_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// All sources feeding the news digest.
#[derive(Debug)]
pub struct NewsSources {
    pub newsapi: Option<newsapi::NewsApi>,
    pub pubmed: pubmed::PubMed,
    pub feeds: rss::FeedReader,
    pub days_back: i64,
}

impl NewsSources {
    pub fn new(newsapi_key: Option<String>, days_back: i64) -> Self {
        Self {
            newsapi: newsapi_key
                .filter(|k| !k.trim().is_empty())
                .map(newsapi::NewsApi::new),
            pubmed: pubmed::PubMed::new(),
            feeds: rss::FeedReader::new(),
            days_back,
        }
    }

    /// Fetch from every source in turn. Failed sources are skipped.
    #[instrument(level = "info", skip_all, fields(days_back = self.days_back))]
    pub async fn fetch_all(&self) -> Vec<Record> {
        let mut records = Vec::new();

        match &self.newsapi {
            Some(newsapi) => records.extend(newsapi.fetch_articles(self.days_back).await),
            None => info!("NewsAPI skipped (no API key)"),
        }
        records.extend(self.pubmed.fetch_articles(self.days_back).await);
        records.extend(self.feeds.fetch_articles(self.days_back).await);

        info!(count = records.len(), "Total records fetched");
        records
    }
}
