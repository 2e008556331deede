//! The news digest: fetch, dedupe, categorize with the LLM, relate to earlier
//! digests and prepend the result to `digests.json`.

use super::RunOutcome;
use crate::config::{CategorySet, DigestConfig};
use crate::llm::{AdapterError, AskAsync};
use crate::models::{
    default_importance, lenient_importance, nullable, CategorizedArticle, Digest, Highlight,
    OrderedMap, Record, Reference,
};
use crate::store::{already_stamped, deduplicate, JsonFile, MergePolicy, Relator, StoreError};
use crate::utils::{extract_json_block, looks_truncated, truncate_chars, truncate_for_log};
use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Description characters shown to the model per article.
const PROMPT_DESCRIPTION_CHARS: usize = 500;

/// Description characters kept as the summary when the model is unavailable.
const FALLBACK_SUMMARY_CHARS: usize = 200;

pub const FALLBACK_WEEKLY_SUMMARY: &str = "Unable to generate summary due to API error.";

/// An absent index points at the first article.
fn first_article() -> usize {
    1
}

/// Accept `4`, `4.0` or `"4"`; anything unusable becomes 0, which matches no article.
fn lenient_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0) as usize,
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// The model's verdict on one article.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleAnalysis {
    /// 1-based position in the prompt.
    #[serde(default = "first_article", deserialize_with = "lenient_index")]
    pub article_index: usize,
    #[serde(default, deserialize_with = "nullable")]
    pub category: String,
    #[serde(default, deserialize_with = "nullable")]
    pub summary: String,
    #[serde(default = "default_importance", deserialize_with = "lenient_importance")]
    pub importance: u8,
    #[serde(default, deserialize_with = "nullable")]
    pub key_entities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HighlightAnalysis {
    #[serde(default = "first_article", deserialize_with = "lenient_index")]
    pub article_index: usize,
    #[serde(default, deserialize_with = "nullable")]
    pub why_important: String,
}

/// Everything the model returns for a batch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Analysis {
    #[serde(default, deserialize_with = "nullable")]
    pub articles: Vec<ArticleAnalysis>,
    #[serde(default, deserialize_with = "nullable")]
    pub highlights: Vec<HighlightAnalysis>,
    #[serde(default, deserialize_with = "nullable")]
    pub weekly_summary: String,
}

impl Analysis {
    /// Deterministic stand-in used when the model call or its JSON fails.
    pub fn fallback(records: &[Record], categories: &CategorySet) -> Self {
        Self {
            articles: records
                .iter()
                .enumerate()
                .map(|(i, record)| ArticleAnalysis {
                    article_index: i + 1,
                    category: categories.fallback.clone(),
                    summary: truncate_chars(&record.description, FALLBACK_SUMMARY_CHARS),
                    importance: default_importance(),
                    key_entities: Vec::new(),
                })
                .collect(),
            highlights: Vec::new(),
            weekly_summary: FALLBACK_WEEKLY_SUMMARY.to_string(),
        }
    }
}

#[derive(Debug, Error)]
enum AnalysisError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("model response is not valid analysis JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Build the categorization prompt for a batch.
pub fn build_prompt(records: &[Record], categories: &CategorySet) -> String {
    let articles = records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "\nArticle {}:\n- Title: {}\n- Source: {}\n- URL: {}\n- Description: {}\n- Is NJ Local: {}\n",
                i + 1,
                if r.title.is_empty() { "No title" } else { &r.title },
                if r.source_name.is_empty() { "Unknown" } else { &r.source_name },
                r.url,
                truncate_chars(&r.description, PROMPT_DESCRIPTION_CHARS),
                r.is_local_nj,
            )
        })
        .join("\n");

    let category_lines = categories
        .entries
        .iter()
        .map(|c| {
            if c.name == "local" {
                format!("   - {}: {} (prioritize articles marked as NJ Local)", c.name, c.description)
            } else {
                format!("   - {}: {}", c.name, c.description)
            }
        })
        .join("\n");

    format!(
        r#"You are helping aggregate ALS (amyotrophic lateral sclerosis) news for a patient's family member who wants to stay informed about research, treatments, and local resources in New Jersey.

Here are the articles to process:

{articles}

Please analyze these articles and:

1. Categorize each article into ONE of these categories:
{category_lines}

2. For each article, provide:
   - A 2-3 sentence summary that captures the key information
   - The category it belongs to
   - An importance score from 1-5 (5 being most important/impactful)

3. Identify the 3-5 most significant stories this week and explain why they're important.

Respond in this exact JSON format:
{{
    "articles": [
        {{
            "article_index": 1,
            "category": "{fallback}",
            "summary": "Your 2-3 sentence summary here. Must include the key facts.",
            "importance": 4,
            "key_entities": ["entity1", "entity2"]
        }}
    ],
    "highlights": [
        {{
            "article_index": 1,
            "why_important": "Brief explanation of significance"
        }}
    ],
    "weekly_summary": "A 2-3 paragraph overview of this week's most important ALS news, written for a family member staying informed."
}}

Important: Every summary must be factual and based only on the article content. Do not make up information."#,
        fallback = categories.fallback,
    )
}

async fn ask_analysis<A>(llm: &A, prompt: &str) -> Result<Analysis, AnalysisError>
where
    A: AskAsync<Response = String>,
{
    let response = llm.ask(prompt).await?;
    debug!(response = %truncate_for_log(&response, 500), "Model response");
    Ok(serde_json::from_str(extract_json_block(&response))?)
}

/// Ask the model to categorize `records`.
///
/// A response cut off mid-JSON is asked for once more. Any remaining failure
/// yields [`Analysis::fallback`].
#[instrument(level = "info", skip_all, fields(records = records.len()))]
pub async fn analyze<A>(llm: &A, records: &[Record], categories: &CategorySet) -> Analysis
where
    A: AskAsync<Response = String>,
{
    let prompt = build_prompt(records, categories);

    let mut result = ask_analysis(llm, &prompt).await;
    if let Err(AnalysisError::Parse(e)) = &result {
        if looks_truncated(e) {
            warn!(error = %e, "EOF while parsing analysis; re-asking once");
            result = ask_analysis(llm, &prompt).await;
        }
    }

    match result {
        Ok(analysis) => {
            info!(
                articles = analysis.articles.len(),
                highlights = analysis.highlights.len(),
                "Analysis complete"
            );
            analysis
        }
        Err(e) => {
            error!(error = %e, "Analysis failed; using fallback categorization");
            Analysis::fallback(records, categories)
        }
    }
}

/// Cap a batch at `max` records, reserving up to `local_quota` slots for local ones.
pub fn limit_batch(records: Vec<Record>, max: usize, local_quota: usize) -> Vec<Record> {
    if records.len() <= max {
        return records;
    }
    let (mut local, mut other): (Vec<Record>, Vec<Record>) =
        records.into_iter().partition(|r| r.is_local_nj);
    let reserved = local_quota.min(max);
    local.truncate(reserved);
    other.truncate(max - reserved);
    local.extend(other);
    info!(count = local.len(), "Limited batch for processing");
    local
}

fn record_at(records: &[Record], index: usize) -> Option<&Record> {
    index.checked_sub(1).and_then(|i| records.get(i))
}

/// Assemble a digest from the processed records and the model's analysis.
pub fn build_digest(
    records: &[Record],
    analysis: Analysis,
    history: &[Digest],
    categories: &CategorySet,
    relator: &Relator,
    now: NaiveDateTime,
) -> Digest {
    let mut by_category: OrderedMap<Vec<CategorizedArticle>> = OrderedMap::new();
    for name in categories.names() {
        by_category.insert(name, Vec::new());
    }

    for entry in analysis
        .articles
        .into_iter()
        .unique_by(|entry| entry.article_index)
    {
        let Some(record) = record_at(records, entry.article_index) else {
            debug!(index = entry.article_index, "Analysis index out of range; skipped");
            continue;
        };
        let summary = if entry.summary.is_empty() {
            record.description.clone()
        } else {
            entry.summary
        };
        let article = CategorizedArticle {
            related_previous: relator.related(&record.title, history),
            record: record.clone(),
            summary,
            importance: entry.importance,
            key_entities: entry.key_entities,
        };
        let category = categories.resolve(&entry.category);
        if let Some(list) = by_category.get_mut(category) {
            list.push(article);
        }
    }

    for list in by_category.values_mut() {
        list.sort_by(|a, b| b.importance.cmp(&a.importance));
    }

    let highlights = analysis
        .highlights
        .into_iter()
        .filter_map(|h| {
            record_at(records, h.article_index).map(|record| Highlight {
                article: record.clone(),
                why_important: h.why_important,
            })
        })
        .collect();

    let references = records
        .iter()
        .map(|r| Reference {
            title: r.title.clone(),
            url: r.url.clone(),
            source: r.source_name.clone(),
            date: r.published_at.clone(),
        })
        .collect();

    let mut category_descriptions = OrderedMap::new();
    for c in &categories.entries {
        category_descriptions.insert(c.name.clone(), c.description.clone());
    }

    Digest {
        date: now.format("%Y-%m-%d").to_string(),
        week_of: now.format("%B %d, %Y").to_string(),
        digest_number: history.len() + 1,
        weekly_summary: analysis.weekly_summary,
        highlights,
        categories: by_category,
        category_descriptions,
        article_count: records.len(),
        references,
        generated_at: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    }
}

/// One configured digest run.
#[derive(Debug)]
pub struct DigestPipeline<'a, A> {
    pub store: JsonFile,
    pub llm: &'a A,
    pub config: &'a DigestConfig,
    pub relator: Relator,
    pub policy: MergePolicy,
}

impl<A> DigestPipeline<'_, A>
where
    A: AskAsync<Response = String>,
{
    /// Run once for the local time `now`.
    #[instrument(level = "info", skip_all, fields(path = %self.store.path().display()))]
    pub async fn run<F>(&self, fetch: F, now: NaiveDateTime) -> Result<RunOutcome, StoreError>
    where
        F: AsyncFnOnce() -> Vec<Record>,
    {
        let mut history: Vec<Digest> = self.store.load_history().await?;
        info!(count = history.len(), "Loaded previous digests");

        let today = now.format("%Y-%m-%d").to_string();
        if already_stamped(&history, &today) {
            info!(%today, "Already have a digest for today; skipping");
            return Ok(RunOutcome::AlreadyDone);
        }

        let fetched = fetch().await;
        if fetched.is_empty() {
            info!("No articles found; leaving history unchanged");
            return Ok(RunOutcome::NoContent);
        }

        let unique = deduplicate(fetched);
        info!(count = unique.len(), "After deduplication");
        let batch = limit_batch(unique, self.config.max_articles, self.config.local_quota);

        let analysis = analyze(self.llm, &batch, &self.config.categories).await;
        let digest = build_digest(
            &batch,
            analysis,
            &history,
            &self.config.categories,
            &self.relator,
            now,
        );

        info!(
            digest_number = digest.digest_number,
            week_of = %digest.week_of,
            articles = digest.article_count,
            "Digest built"
        );
        for (category, articles) in digest.categories.iter().filter(|(_, a)| !a.is_empty()) {
            info!(%category, count = articles.len(), "Category");
        }

        self.policy.prepend(&mut history, digest);
        self.store.write(&history).await?;
        Ok(RunOutcome::Written {
            entries: history.len(),
        })
    }
}
