//! NewsAPI.org search adapter.
//!
//! Two searches run per fetch: a general query and a New Jersey query whose
//! results are flagged as local.

use super::FETCH_TIMEOUT;
use crate::models::{nullable, Record};
use chrono::{Duration, Local};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use tracing::{error, info, instrument, warn};

const NEWSAPI_BASE: &str = "https://newsapi.org/v2/everything";

pub const GENERAL_QUERY: &str = "\"ALS\" OR \"amyotrophic lateral sclerosis\" OR \"Lou Gehrig's disease\" OR \"motor neuron disease\"";

pub const LOCAL_QUERY: &str = "(\"ALS\" OR \"amyotrophic lateral sclerosis\") AND (\"New Jersey\" OR \"NJ\" OR \"New Brunswick\")";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, deserialize_with = "nullable")]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    articles: Vec<ApiArticle>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSource {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiArticle {
    #[serde(default, deserialize_with = "nullable")]
    source: ApiSource,
    #[serde(default, deserialize_with = "nullable")]
    author: String,
    #[serde(default, deserialize_with = "nullable")]
    title: String,
    #[serde(default, deserialize_with = "nullable")]
    description: String,
    #[serde(default, deserialize_with = "nullable")]
    url: String,
    #[serde(default, deserialize_with = "nullable")]
    url_to_image: String,
    #[serde(default, deserialize_with = "nullable")]
    published_at: String,
    #[serde(default, deserialize_with = "nullable")]
    content: String,
}

fn normalize(article: ApiArticle, is_local: bool) -> Record {
    Record {
        title: article.title.trim().to_string(),
        description: article.description,
        content: article.content,
        url: article.url,
        source_name: article.source.name.unwrap_or_else(|| "Unknown".to_string()),
        source_type: "newsapi".to_string(),
        published_at: article.published_at,
        author: article.author,
        image_url: article.url_to_image,
        is_local_nj: is_local,
        ..Default::default()
    }
}

/// NewsAPI client.
#[derive(Clone)]
pub struct NewsApi {
    api_key: String,
    http: reqwest::Client,
}

impl fmt::Debug for NewsApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsApi").finish_non_exhaustive()
    }
}

impl NewsApi {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: crate::utils::http_client(FETCH_TIMEOUT),
        }
    }

    /// Run one search and normalize its results.
    #[instrument(level = "info", skip(self))]
    pub async fn search(
        &self,
        query: &str,
        from_date: &str,
        page_size: u32,
        is_local: bool,
    ) -> Result<Vec<Record>, Box<dyn Error>> {
        let page_size = page_size.to_string();
        let response = self
            .http
            .get(NEWSAPI_BASE)
            .query(&[
                ("q", query),
                ("from", from_date),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
                ("language", "en"),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let data: SearchResponse = serde_json::from_str(&response.text().await?)?;
        if data.status != "ok" {
            warn!(
                message = %data.message.unwrap_or_else(|| "Unknown error".to_string()),
                "NewsAPI returned an error status"
            );
            return Ok(Vec::new());
        }

        Ok(data
            .articles
            .into_iter()
            .map(|article| normalize(article, is_local))
            .collect())
    }

    /// Fetch general and local ALS news from the last `days_back` days.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_articles(&self, days_back: i64) -> Vec<Record> {
        let from_date = (Local::now() - Duration::days(days_back))
            .format("%Y-%m-%d")
            .to_string();
        let mut records = Vec::new();

        match self.search(GENERAL_QUERY, &from_date, 100, false).await {
            Ok(found) => {
                info!(count = found.len(), "NewsAPI general articles");
                records.extend(found);
            }
            Err(e) => error!(error = %e, "NewsAPI request failed"),
        }

        match self.search(LOCAL_QUERY, &from_date, 50, true).await {
            Ok(found) => {
                info!(count = found.len(), "NewsAPI local articles");
                records.extend(found);
            }
            Err(e) => error!(error = %e, "NewsAPI local request failed"),
        }

        records
    }
}
