//! Data models for fetched records and the persisted histories built from them.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Record`]: A normalized content item (article, paper abstract, feed entry)
//! - [`CategorizedArticle`]: A record after LLM categorization and relatedness lookup
//! - [`Digest`]: One run's complete categorized output bundle
//! - [`Paper`] / [`SelectedPaper`]: Preprint metadata and the daily selection built from it
//! - [`OpeningsCache`]: The bounded cache of generated story pages
//!
//! Field names are snake_case on the wire so history files written by earlier runs keep loading.
//! Text fields tolerate JSON `null`, which upstream APIs return freely.

use crate::store::{DateStamped, Fingerprint};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Deserialize `null` as the type's default instead of failing.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A normalized content item as returned by any source adapter.
///
/// NewsAPI, PubMed and feed entries all land in this shape. Source-specific
/// extras (`pmid`, `publication_types`, `category_hint`) are only present for
/// the sources that produce them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Record {
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub content: String,
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source_type: String,
    #[serde(default, deserialize_with = "nullable")]
    pub published_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub author: String,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub is_local_nj: bool,
    /// PubMed identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    /// PubMed publication-type tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_types: Option<Vec<String>>,
    /// Category suggested by the feed the record came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_hint: Option<String>,
    /// Identity key assigned during deduplication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
}

impl Fingerprint for Record {
    fn url(&self) -> &str {
        &self.url
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn set_identity_key(&mut self, key: String) {
        self.article_id = Some(key);
    }
}

/// A back-reference from a new article to a topically related article of an earlier digest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RelatedArticle {
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
    /// Date stamp of the digest the related article was published in.
    #[serde(default, alias = "source_date", deserialize_with = "nullable")]
    pub digest_date: String,
}

/// A record after the LLM step: summary, category-local importance and relations.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CategorizedArticle {
    #[serde(flatten)]
    pub record: Record,
    #[serde(default, deserialize_with = "nullable")]
    pub summary: String,
    #[serde(default = "default_importance", deserialize_with = "lenient_importance")]
    pub importance: u8,
    #[serde(default, deserialize_with = "nullable")]
    pub key_entities: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub related_previous: Vec<RelatedArticle>,
}

pub(crate) fn default_importance() -> u8 {
    3
}

/// Accept numbers or numeric strings, clamped to 1..=5; anything else is 3.
pub(crate) fn lenient_importance<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let score = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(score
        .map(|s| s.round().clamp(1.0, 5.0) as u8)
        .unwrap_or_else(default_importance))
}

/// A story the LLM singled out as significant for the period.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Highlight {
    #[serde(default, deserialize_with = "nullable")]
    pub article: Record,
    #[serde(default, deserialize_with = "nullable")]
    pub why_important: String,
}

/// Bibliography entry listing every record that went into a digest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Reference {
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source: String,
    #[serde(default, deserialize_with = "nullable")]
    pub date: String,
}

/// One run's complete categorized output bundle.
///
/// `date` (`YYYY-MM-DD`) doubles as the idempotence stamp: a history whose
/// newest digest carries today's date is not extended again.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Digest {
    #[serde(deserialize_with = "nullable")]
    pub date: String,
    /// Human readable period label, e.g. `"January 01, 2024"`.
    #[serde(deserialize_with = "nullable")]
    pub week_of: String,
    #[serde(deserialize_with = "nullable")]
    pub digest_number: usize,
    #[serde(deserialize_with = "nullable")]
    pub weekly_summary: String,
    #[serde(deserialize_with = "nullable")]
    pub highlights: Vec<Highlight>,
    #[serde(deserialize_with = "nullable")]
    pub categories: OrderedMap<Vec<CategorizedArticle>>,
    #[serde(deserialize_with = "nullable")]
    pub category_descriptions: OrderedMap<String>,
    #[serde(deserialize_with = "nullable")]
    pub article_count: usize,
    #[serde(deserialize_with = "nullable")]
    pub references: Vec<Reference>,
    #[serde(deserialize_with = "nullable")]
    pub generated_at: String,
}

impl DateStamped for Digest {
    fn date_stamp(&self) -> Option<&str> {
        Some(self.date.as_str()).filter(|d| !d.is_empty())
    }
}

/// Preprint metadata as returned by the arXiv Atom API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Paper {
    /// arXiv identifier, e.g. `2401.01234v1`.
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    /// Abstract page URL.
    pub link: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
}

impl Fingerprint for Paper {
    fn url(&self) -> &str {
        &self.link
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// The paper chosen for a given day.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SelectedPaper {
    #[serde(flatten)]
    pub paper: Paper,
    #[serde(default, deserialize_with = "nullable")]
    pub selected_date: String,
}

impl DateStamped for SelectedPaper {
    fn date_stamp(&self) -> Option<&str> {
        Some(self.selected_date.as_str()).filter(|d| !d.is_empty())
    }
}

/// Which end of a story a generated page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Opening,
    Ending,
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageKind::Opening => f.write_str("opening"),
            PageKind::Ending => f.write_str("ending"),
        }
    }
}

/// One generated opening or ending page.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GeneratedPage {
    pub text: String,
    pub inspired_by: String,
    pub author: String,
    #[serde(rename = "type")]
    pub kind: PageKind,
    pub generated_at: String,
}

/// The generator cache: two bounded lists, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OpeningsCache {
    #[serde(default, deserialize_with = "nullable")]
    pub openings: Vec<GeneratedPage>,
    #[serde(default, deserialize_with = "nullable")]
    pub endings: Vec<GeneratedPage>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl OpeningsCache {
    pub fn pages(&self, kind: PageKind) -> &Vec<GeneratedPage> {
        match kind {
            PageKind::Opening => &self.openings,
            PageKind::Ending => &self.endings,
        }
    }

    pub fn pages_mut(&mut self, kind: PageKind) -> &mut Vec<GeneratedPage> {
        match kind {
            PageKind::Opening => &mut self.openings,
            PageKind::Ending => &mut self.endings,
        }
    }
}

/// A string-keyed map that keeps insertion order on the wire.
///
/// Digest categories are listed in the configured category order, and the
/// relatedness scan walks them in that same stored order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, keeping the position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.0.iter_mut().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map with string keys")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = OrderedMap::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(OrderedMap::new())
            }
        }

        deserializer.deserialize_any(OrderedMapVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tolerates_nulls() {
        let json = r#"{
            "title": "ALS trial begins",
            "description": null,
            "url": "http://a",
            "author": null,
            "is_local_nj": null
        }"#;

        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.title, "ALS trial begins");
        assert_eq!(record.description, "");
        assert_eq!(record.author, "");
        assert!(!record.is_local_nj);
        assert!(record.pmid.is_none());
    }

    #[test]
    fn test_record_omits_absent_extras() {
        let record = Record {
            title: "Test".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("pmid"));
        assert!(!json.contains("article_id"));
        assert!(json.contains("\"is_local_nj\":false"));
    }

    #[test]
    fn test_ordered_map_keeps_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("research", 1);
        map.insert("treatment", 2);
        map.insert("assistance", 3);
        map.insert("research", 4);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"research":4,"treatment":2,"assistance":3}"#);

        let back: OrderedMap<i32> = serde_json::from_str(r#"{"z":1,"a":2,"m":3}"#).unwrap();
        let keys: Vec<&str> = back.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_categorized_article_flattens_record() {
        let article = CategorizedArticle {
            record: Record {
                title: "Gene therapy study".to_string(),
                url: "https://example.com/a".to_string(),
                ..Default::default()
            },
            summary: "Summary".to_string(),
            importance: 4,
            key_entities: vec!["FDA".to_string()],
            related_previous: vec![],
        };

        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(value["title"], "Gene therapy study");
        assert_eq!(value["importance"], 4);

        let back: CategorizedArticle = serde_json::from_value(value).unwrap();
        assert_eq!(back, article);
    }

    #[test]
    fn test_related_article_accepts_source_date_alias() {
        let related: RelatedArticle =
            serde_json::from_str(r#"{"title":"t","url":"u","source_date":"2024-01-01"}"#).unwrap();
        assert_eq!(related.digest_date, "2024-01-01");
    }

    #[test]
    fn test_sparse_selected_paper_loads() {
        let papers: Vec<SelectedPaper> =
            serde_json::from_str(r#"[{"selected_date":"2024-01-01","id":"x"}]"#).unwrap();
        assert_eq!(papers[0].paper.id, "x");
        assert_eq!(papers[0].date_stamp(), Some("2024-01-01"));
        assert!(papers[0].paper.authors.is_empty());
    }

    #[test]
    fn test_loose_digest_history_loads() {
        let json = r#"[{
            "date": "2024-01-01",
            "digest_number": null,
            "categories": {
                "research": [
                    {"title": "t", "url": "u", "importance": "4"},
                    {"title": "t2", "url": "u2", "importance": 9.4},
                    {"title": "t3", "url": "u3", "importance": null, "summary": null}
                ]
            },
            "highlights": [{"article": null, "why_important": "w"}],
            "weekly_summary": null,
            "references": null
        }]"#;

        let history: Vec<Digest> = serde_json::from_str(json).unwrap();
        let digest = &history[0];
        assert_eq!(digest.date_stamp(), Some("2024-01-01"));
        assert_eq!(digest.digest_number, 0);
        assert_eq!(digest.weekly_summary, "");
        assert!(digest.references.is_empty());
        assert_eq!(digest.highlights[0].article.title, "");

        let research = digest.categories.get("research").unwrap();
        let importance: Vec<u8> = research.iter().map(|a| a.importance).collect();
        assert_eq!(importance, vec![4, 5, 3]);
        assert_eq!(research[2].summary, "");
    }

    #[test]
    fn test_digest_date_stamp_empty_is_none() {
        let digest = Digest::default();
        assert_eq!(digest.date_stamp(), None);
    }

    #[test]
    fn test_generated_page_kind_serializes_as_type() {
        let page = GeneratedPage {
            text: "It began".to_string(),
            inspired_by: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            kind: PageKind::Opening,
            generated_at: "2024-01-01T00:00:00".to_string(),
        };

        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["type"], "opening");
    }
}
