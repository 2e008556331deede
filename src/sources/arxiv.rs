//! arXiv Atom API adapter.

use super::FETCH_TIMEOUT;
use crate::models::Paper;
use feed_rs::model::Entry;
use reqwest::header::USER_AGENT;
use std::error::Error;
use std::time::Duration;
use tracing::{error, info, instrument};
use url::Url;

const ARXIV_API: &str = "http://export.arxiv.org/api/query";

/// arXiv asks automated clients to identify themselves.
const ARXIV_USER_AGENT: &str = "Mozilla/5.0 (compatible; ArXivBot/1.0; +https://github.com)";

fn one_line(text: &str) -> String {
    text.trim().replace('\n', " ")
}

fn to_paper(entry: Entry) -> Paper {
    let id = entry
        .id
        .rsplit_once("/abs/")
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| entry.id.clone());

    Paper {
        title: entry.title.map(|t| one_line(&t.content)).unwrap_or_default(),
        summary: entry.summary.map(|s| one_line(&s.content)).unwrap_or_default(),
        published: entry
            .published
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_default(),
        authors: entry.authors.into_iter().map(|p| p.name).collect(),
        categories: entry
            .categories
            .into_iter()
            .map(|c| c.term)
            .filter(|t| !t.is_empty())
            .collect(),
        link: entry.id,
        id,
    }
}

/// Parse an arXiv API response into papers.
pub fn parse_papers(body: &[u8]) -> Result<Vec<Paper>, feed_rs::parser::ParseFeedError> {
    let feed = feed_rs::parser::parse(body)?;
    Ok(feed.entries.into_iter().map(to_paper).collect())
}

/// Client for the arXiv export API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    http: reqwest::Client,
    max_results: usize,
}

impl ArxivClient {
    pub fn new(max_results: usize) -> Self {
        Self {
            http: crate::utils::http_client(FETCH_TIMEOUT),
            max_results,
        }
    }

    fn query_url(&self, query: &str) -> Result<Url, url::ParseError> {
        let max_results = self.max_results.to_string();
        Url::parse_with_params(
            ARXIV_API,
            &[
                ("search_query", query),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ],
        )
    }

    /// Fetch the newest submissions matching one query.
    #[instrument(level = "info", skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<Paper>, Box<dyn Error>> {
        let body = self
            .http
            .get(self.query_url(query)?)
            .header(USER_AGENT, ARXIV_USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(parse_papers(&body)?)
    }

    /// Run every query in order, pausing `delay` between requests.
    /// Failed queries are logged and contribute nothing.
    #[instrument(level = "info", skip_all, fields(queries = queries.len()))]
    pub async fn fetch_all(&self, queries: &[String], delay: Duration) -> Vec<Paper> {
        let mut papers = Vec::new();
        for (i, query) in queries.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            match self.search(query).await {
                Ok(found) => {
                    info!(%query, count = found.len(), "arXiv papers");
                    papers.extend(found);
                }
                Err(e) => error!(%query, error = %e, "arXiv query failed"),
            }
        }
        papers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <id>http://arxiv.org/api/query</id>
  <title>ArXiv Query</title>
  <updated>2024-01-02T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <updated>2024-01-01T18:00:00Z</updated>
    <published>2024-01-01T18:00:00Z</published>
    <title>Adversarial Robustness of
  Transformer Models</title>
    <summary>  We study attacks
on neural networks.  </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2401.00001v1" rel="alternate" type="text/html"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CR" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_papers() {
        let papers = parse_papers(ATOM.as_bytes()).unwrap();
        assert_eq!(papers.len(), 1);

        let p = &papers[0];
        assert_eq!(p.id, "2401.00001v1");
        assert_eq!(p.link, "http://arxiv.org/abs/2401.00001v1");
        assert!(!p.title.contains('\n'));
        assert!(p.title.starts_with("Adversarial Robustness of"));
        assert!(p.summary.starts_with("We study attacks"));
        assert!(!p.summary.contains('\n'));
        assert_eq!(p.published, "2024-01-01T18:00:00Z");
        assert_eq!(p.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(p.categories, vec!["cs.LG", "cs.CR"]);
    }

    #[test]
    fn test_query_url() {
        let client = ArxivClient::new(20);
        let url = client.query_url("cat:cs.CR").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("search_query".to_string(), "cat:cs.CR".to_string())));
        assert!(pairs.contains(&("max_results".to_string(), "20".to_string())));
        assert!(pairs.contains(&("sortOrder".to_string(), "descending".to_string())));
    }
}
