//! PubMed adapter over the NCBI E-utilities.
//!
//! `esearch` returns matching PMIDs as JSON; `efetch` returns the article
//! details as XML, which is deserialized with quick-xml's serde support.

use super::{BULK_FETCH_TIMEOUT, FETCH_TIMEOUT};
use crate::models::Record;
use crate::utils::truncate_chars;
use chrono::{Duration, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::error::Error;
use std::time::Duration as StdDuration;
use tracing::{debug, error, info, instrument, warn};

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

pub const SEARCH_QUERY: &str = "(amyotrophic lateral sclerosis[Title/Abstract] OR ALS[Title/Abstract] OR motor neuron disease[Title/Abstract]) AND (clinical trial[Publication Type] OR research[Title/Abstract] OR treatment[Title/Abstract] OR therapy[Title/Abstract])";

const MAX_IDS: u32 = 50;
const DESCRIPTION_CHARS: usize = 500;

/// Pause between esearch and efetch, within NCBI's unauthenticated rate limit.
const REQUEST_SPACING: StdDuration = StdDuration::from_millis(500);

/// Inline markup that appears inside titles and abstracts, including namespaced MathML.
static INLINE_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?(?:i|b|u|sup|sub|em|strong|[A-Za-z][\w.-]*:[\w.-]+)(?:\s[^>]*)?/?>").unwrap()
});

/// One `<PubmedArticle>` element of an efetch payload.
static ARTICLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<PubmedArticle\b[^>]*>.*?</PubmedArticle>").unwrap());

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PubmedArticle {
    medline_citation: Option<MedlineCitation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MedlineCitation {
    #[serde(rename = "PMID")]
    pmid: Option<Text>,
    article: Option<ArticleXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ArticleXml {
    journal: Option<Journal>,
    article_title: Option<Text>,
    #[serde(rename = "Abstract")]
    abstract_: Option<AbstractXml>,
    author_list: Option<AuthorList>,
    publication_type_list: Option<PublicationTypeList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Journal {
    title: Option<String>,
    journal_issue: Option<JournalIssue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JournalIssue {
    pub_date: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PubDate {
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AbstractXml {
    #[serde(rename = "AbstractText", default)]
    sections: Vec<AbstractText>,
}

#[derive(Debug, Deserialize)]
struct AbstractText {
    #[serde(rename = "@Label")]
    label: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    #[serde(rename = "Author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Author {
    last_name: Option<String>,
    fore_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublicationTypeList {
    #[serde(rename = "PublicationType", default)]
    types: Vec<Text>,
}

impl PubDate {
    /// `Day Month Year`, dropping leading parts that are absent.
    fn display(&self) -> String {
        let Some(year) = &self.year else {
            return String::new();
        };
        match (&self.month, &self.day) {
            (Some(month), Some(day)) => format!("{day} {month} {year}"),
            (Some(month), None) => format!("{month} {year}"),
            _ => year.clone(),
        }
    }
}

impl Author {
    fn display_name(&self) -> Option<String> {
        let last = self.last_name.as_deref().filter(|s| !s.is_empty())?;
        Some(match self.fore_name.as_deref().filter(|s| !s.is_empty()) {
            Some(first) => format!("{first} {last}"),
            None => last.to_string(),
        })
    }
}

fn author_line(names: &[String]) -> String {
    let mut line = names.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    if names.len() > 3 {
        line.push_str("...");
    }
    line
}

fn to_record(article: PubmedArticle) -> Option<Record> {
    let medline = article.medline_citation?;
    let pmid = medline.pmid.map(|p| p.value.trim().to_string()).unwrap_or_default();
    let details = medline.article?;

    let abstract_text = details
        .abstract_
        .map(|a| {
            a.sections
                .into_iter()
                .filter(|s| !s.text.is_empty())
                .map(|s| match s.label.filter(|l| !l.is_empty()) {
                    Some(label) => format!("{label}: {}", s.text),
                    None => s.text,
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let authors: Vec<String> = details
        .author_list
        .map(|list| list.authors.iter().filter_map(Author::display_name).collect())
        .unwrap_or_default();

    let (journal, published_at) = match details.journal {
        Some(journal) => {
            let date = journal
                .journal_issue
                .and_then(|issue| issue.pub_date)
                .map(|d| d.display())
                .unwrap_or_default();
            (journal.title.unwrap_or_default(), date)
        }
        None => (String::new(), String::new()),
    };

    let publication_types = details
        .publication_type_list
        .map(|list| {
            list.types
                .into_iter()
                .map(|t| t.value)
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Some(Record {
        title: details
            .article_title
            .map(|t| t.value.trim().to_string())
            .unwrap_or_default(),
        description: truncate_chars(&abstract_text, DESCRIPTION_CHARS),
        content: abstract_text,
        url: format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"),
        source_name: if journal.is_empty() {
            "PubMed".to_string()
        } else {
            journal
        },
        source_type: "pubmed".to_string(),
        published_at,
        author: author_line(&authors),
        pmid: Some(pmid),
        publication_types: Some(publication_types),
        ..Default::default()
    })
}

/// Parse an efetch XML payload into records.
///
/// Articles are deserialized one at a time; an article whose markup does not
/// fit is logged and skipped without losing the rest of the batch.
pub fn parse_articles(xml: &str) -> Vec<Record> {
    let cleaned = INLINE_MARKUP.replace_all(xml, "");
    ARTICLE_BLOCK
        .find_iter(&cleaned)
        .enumerate()
        .filter_map(|(i, block)| {
            match quick_xml::de::from_str::<PubmedArticle>(block.as_str()) {
                Ok(article) => to_record(article),
                Err(e) => {
                    warn!(position = i, error = %e, "Skipping unparsable PubMed article");
                    None
                }
            }
        })
        .collect()
}

/// PubMed client.
#[derive(Debug, Clone)]
pub struct PubMed {
    search_http: reqwest::Client,
    fetch_http: reqwest::Client,
}

impl Default for PubMed {
    fn default() -> Self {
        Self::new()
    }
}

impl PubMed {
    pub fn new() -> Self {
        Self {
            search_http: crate::utils::http_client(FETCH_TIMEOUT),
            fetch_http: crate::utils::http_client(BULK_FETCH_TIMEOUT),
        }
    }

    /// Search for PMIDs published in the `days_back` window ending today.
    #[instrument(level = "info", skip(self))]
    pub async fn search_ids(&self, days_back: i64) -> Result<Vec<String>, Box<dyn Error>> {
        let end = Local::now().date_naive();
        let start = end - Duration::days(days_back);
        let term = format!(
            "{SEARCH_QUERY} AND {}:{}[PDAT]",
            start.format("%Y/%m/%d"),
            end.format("%Y/%m/%d")
        );
        let retmax = MAX_IDS.to_string();

        let body = self
            .search_http
            .get(ESEARCH_URL)
            .query(&[
                ("db", "pubmed"),
                ("term", term.as_str()),
                ("retmax", retmax.as_str()),
                ("retmode", "json"),
                ("sort", "date"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let envelope: SearchEnvelope = serde_json::from_str(&body)?;
        info!(count = envelope.esearchresult.idlist.len(), "PubMed ids found");
        Ok(envelope.esearchresult.idlist)
    }

    /// Download and parse details for the given PMIDs.
    #[instrument(level = "info", skip_all, fields(ids = pmids.len()))]
    pub async fn fetch_details(&self, pmids: &[String]) -> Result<Vec<Record>, Box<dyn Error>> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = pmids.join(",");
        let xml = self
            .fetch_http
            .get(EFETCH_URL)
            .query(&[("db", "pubmed"), ("id", ids.as_str()), ("retmode", "xml")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(bytes = xml.len(), "PubMed efetch payload");
        Ok(parse_articles(&xml))
    }

    /// Search then fetch. Any failure yields an empty batch.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_articles(&self, days_back: i64) -> Vec<Record> {
        let pmids = match self.search_ids(days_back).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "PubMed search failed");
                return Vec::new();
            }
        };
        if pmids.is_empty() {
            return Vec::new();
        }

        tokio::time::sleep(REQUEST_SPACING).await;

        match self.fetch_details(&pmids).await {
            Ok(records) => {
                info!(count = records.len(), "PubMed articles parsed");
                records
            }
            Err(e) => {
                error!(error = %e, "PubMed fetch failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="Publisher" Owner="NLM">
      <PMID Version="1">38000001</PMID>
      <Article PubModel="Print-Electronic">
        <Journal>
          <Title>Annals of Neurology</Title>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2024</Year><Month>Jan</Month><Day>05</Day></PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>Tofersen in <i>SOD1</i> ALS: a trial</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">SOD1 mutations cause ALS.</AbstractText>
          <AbstractText Label="RESULTS">Neurofilament fell.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y"><LastName>Miller</LastName><ForeName>Timothy</ForeName></Author>
          <Author ValidYN="Y"><LastName>Cudkowicz</LastName><ForeName>Merit</ForeName></Author>
          <Author ValidYN="Y"><LastName>Genge</LastName><ForeName>Angela</ForeName></Author>
          <Author ValidYN="Y"><CollectiveName>VALOR Group</CollectiveName></Author>
          <Author ValidYN="Y"><LastName>Shaw</LastName></Author>
        </AuthorList>
        <PublicationTypeList>
          <PublicationType UI="D016449">Randomized Controlled Trial</PublicationType>
          <PublicationType UI="D016428">Journal Article</PublicationType>
        </PublicationTypeList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation Status="Publisher" Owner="NLM">
      <PMID Version="1">38000002</PMID>
      <Article PubModel="Electronic">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2023</Year></PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>Motor neuron disease registry</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_articles() {
        let records = parse_articles(SAMPLE);
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.title, "Tofersen in SOD1 ALS: a trial");
        assert_eq!(
            first.content,
            "BACKGROUND: SOD1 mutations cause ALS. RESULTS: Neurofilament fell."
        );
        assert_eq!(first.url, "https://pubmed.ncbi.nlm.nih.gov/38000001/");
        assert_eq!(first.source_name, "Annals of Neurology");
        assert_eq!(first.source_type, "pubmed");
        assert_eq!(first.published_at, "05 Jan 2024");
        assert_eq!(
            first.author,
            "Timothy Miller, Merit Cudkowicz, Angela Genge..."
        );
        assert_eq!(first.pmid.as_deref(), Some("38000001"));
        assert_eq!(
            first.publication_types.as_deref(),
            Some(&["Randomized Controlled Trial".to_string(), "Journal Article".to_string()][..])
        );

        let second = &records[1];
        assert_eq!(second.source_name, "PubMed");
        assert_eq!(second.published_at, "2023");
        assert_eq!(second.description, "");
        assert_eq!(second.author, "");
    }

    #[test]
    fn test_description_truncated() {
        let long = "x".repeat(800);
        let xml = format!(
            "<PubmedArticleSet><PubmedArticle><MedlineCitation><PMID>1</PMID><Article>\
             <ArticleTitle>T</ArticleTitle><Abstract><AbstractText>{long}</AbstractText></Abstract>\
             </Article></MedlineCitation></PubmedArticle></PubmedArticleSet>"
        );
        let records = parse_articles(&xml);
        assert_eq!(records[0].description.chars().count(), 500);
        assert_eq!(records[0].content.len(), 800);
    }

    #[test]
    fn test_mathml_abstract_keeps_batch() {
        let xml = r#"<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation><PMID>1</PMID><Article>
      <ArticleTitle>Serum <mml:math xmlns:mml="http://www.w3.org/1998/Math/MathML"><mml:mi>x</mml:mi></mml:math> levels</ArticleTitle>
      <Abstract><AbstractText>We measured <mml:math><mml:mi>x</mml:mi></mml:math> in patients.</AbstractText></Abstract>
    </Article></MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation><PMID>2</PMID><Article>
      <ArticleTitle>Clean article</ArticleTitle>
      <Abstract><AbstractText>Plain text.</AbstractText></Abstract>
    </Article></MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let records = parse_articles(xml);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Serum x levels");
        assert_eq!(records[0].content, "We measured x in patients.");
        assert_eq!(records[1].title, "Clean article");
        assert_eq!(records[1].pmid.as_deref(), Some("2"));
    }

    #[test]
    fn test_unexpected_child_markup_skips_only_that_article() {
        let xml = "<PubmedArticleSet>\
             <PubmedArticle><MedlineCitation><PMID>1</PMID><Article>\
             <ArticleTitle>Odd</ArticleTitle>\
             <Abstract><AbstractText>Before <xref>1</xref> after</AbstractText></Abstract>\
             </Article></MedlineCitation></PubmedArticle>\
             <PubmedArticle><MedlineCitation><PMID>2</PMID><Article>\
             <ArticleTitle>Clean</ArticleTitle>\
             </Article></MedlineCitation></PubmedArticle>\
             </PubmedArticleSet>";

        let records = parse_articles(xml);
        assert!(records.iter().any(|r| r.pmid.as_deref() == Some("2") && r.title == "Clean"));
    }

    #[test]
    fn test_garbage_payload_is_empty() {
        assert!(parse_articles("<html><body>Service unavailable</body></html>").is_empty());
    }

    #[test]
    fn test_author_line() {
        let names: Vec<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        assert_eq!(author_line(&names), "A, B");
        assert_eq!(author_line(&[]), "");
    }
}
