//! RSS/Atom feed adapter.
//!
//! Reads the dedicated ALS feeds and a set of Google News search feeds.
//! Entries older than the lookback window are dropped, as are entries
//! missing a title or link.

use super::FETCH_TIMEOUT;
use crate::models::Record;
use crate::utils::{clean_html, truncate_chars};
use chrono::{DateTime, Duration, Utc};
use feed_rs::model::Entry;
use futures::stream::{self, StreamExt};
use std::error::Error;
use tracing::{error, info, instrument};

const GOOGLE_NEWS_RSS: &str = "https://news.google.com/rss/search";

/// A feed to poll.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
    pub category_hint: Option<String>,
    pub is_local: bool,
}

/// The dedicated ALS feeds, each with a category hint.
pub fn dedicated_feeds() -> Vec<FeedSpec> {
    vec![
        FeedSpec {
            name: "ALS Association News".to_string(),
            url: "https://www.als.org/news/feed".to_string(),
            category_hint: Some("assistance".to_string()),
            is_local: false,
        },
        FeedSpec {
            name: "ALS News Today".to_string(),
            url: "https://alsnewstoday.com/feed/".to_string(),
            category_hint: Some("research".to_string()),
            is_local: false,
        },
    ]
}

pub const GOOGLE_NEWS_QUERIES: [&str; 4] = [
    "ALS amyotrophic lateral sclerosis",
    "ALS research treatment",
    "ALS clinical trial",
    "\"New Jersey\" ALS",
];

/// Build the feed for one Google News search.
pub fn google_news_feed(query: &str) -> FeedSpec {
    FeedSpec {
        name: format!("Google News ({}...)", truncate_chars(query, 30)),
        url: format!(
            "{GOOGLE_NEWS_RSS}?q={}&hl=en-US&gl=US&ceid=US:en",
            urlencoding::encode(query)
        ),
        category_hint: None,
        is_local: query.contains("New Jersey") || query.contains("NJ"),
    }
}

/// Every feed polled for the digest, dedicated feeds first.
pub fn all_feeds() -> Vec<FeedSpec> {
    let mut feeds = dedicated_feeds();
    feeds.extend(GOOGLE_NEWS_QUERIES.iter().map(|q| google_news_feed(q)));
    feeds
}

fn image_url(entry: &Entry) -> String {
    entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .find(|c| {
            c.content_type
                .as_ref()
                .is_some_and(|t| t.to_string().starts_with("image"))
        })
        .and_then(|c| c.url.as_ref())
        .map(|u| u.to_string())
        .unwrap_or_default()
}

fn to_record(entry: Entry, spec: &FeedSpec, cutoff: DateTime<Utc>) -> Option<Record> {
    let published = entry.published.or(entry.updated);
    if published.is_some_and(|dt| dt < cutoff) {
        return None;
    }

    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();
    let url = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
    if title.is_empty() || url.is_empty() {
        return None;
    }

    Some(Record {
        title,
        description: entry
            .summary
            .as_ref()
            .map(|s| clean_html(&s.content))
            .unwrap_or_default(),
        content: entry
            .content
            .as_ref()
            .and_then(|c| c.body.as_deref())
            .map(clean_html)
            .unwrap_or_default(),
        url,
        source_name: spec.name.clone(),
        source_type: "rss".to_string(),
        published_at: published
            .map(|dt| dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_default(),
        author: entry
            .authors
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_default(),
        image_url: image_url(&entry),
        is_local_nj: spec.is_local,
        category_hint: spec.category_hint.clone(),
        ..Default::default()
    })
}

/// Parse a feed body into records for `spec`.
pub fn parse_feed(
    body: &[u8],
    spec: &FeedSpec,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Record>, feed_rs::parser::ParseFeedError> {
    let feed = feed_rs::parser::parse(body)?;
    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| to_record(entry, spec, cutoff))
        .collect())
}

/// Fetches every configured feed.
#[derive(Debug, Clone)]
pub struct FeedReader {
    pub feeds: Vec<FeedSpec>,
    http: reqwest::Client,
}

impl Default for FeedReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedReader {
    pub fn new() -> Self {
        Self {
            feeds: all_feeds(),
            http: crate::utils::http_client(FETCH_TIMEOUT),
        }
    }

    #[instrument(level = "info", skip_all, fields(feed = %spec.name))]
    async fn fetch_feed(
        &self,
        spec: &FeedSpec,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Record>, Box<dyn Error>> {
        let body = self
            .http
            .get(&spec.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(parse_feed(&body, spec, cutoff)?)
    }

    /// Fetch all feeds in order. Failed feeds are logged and skipped.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_articles(&self, days_back: i64) -> Vec<Record> {
        let cutoff = Utc::now() - Duration::days(days_back);

        let batches: Vec<Vec<Record>> = stream::iter(self.feeds.iter())
            .then(|spec| async move {
                match self.fetch_feed(spec, cutoff).await {
                    Ok(records) => {
                        info!(feed = %spec.name, count = records.len(), "Feed entries");
                        records
                    }
                    Err(e) => {
                        error!(feed = %spec.name, error = %e, "Feed fetch failed");
                        Vec::new()
                    }
                }
            })
            .collect()
            .await;

        batches.into_iter().flatten().collect()
    }
}
