//! Lexical relatedness between a new article and recent digests.
//!
//! Two titles are related when their lowercased, whitespace-split word sets
//! share at least `min_overlap` words that are not stopwords. This is a cheap
//! heuristic; embedding similarity would be the natural replacement.

use crate::config::RelatorConfig;
use crate::models::{Digest, RelatedArticle};
use std::collections::HashSet;

/// Finds earlier articles whose titles overlap a new title.
#[derive(Debug, Clone)]
pub struct Relator {
    lookback: usize,
    max_related: usize,
    min_overlap: usize,
    stopwords: HashSet<String>,
}

impl Default for Relator {
    fn default() -> Self {
        Self::new(&RelatorConfig::default())
    }
}

fn title_words(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

impl Relator {
    pub fn new(config: &RelatorConfig) -> Self {
        Self {
            lookback: config.lookback,
            max_related: config.max_related,
            min_overlap: config.min_overlap,
            stopwords: config.stopwords.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    /// Number of shared non-stopword words between two titles.
    pub fn overlap(&self, a: &str, b: &str) -> usize {
        let a = title_words(a);
        let b = title_words(b);
        self.meaningful_overlap(&a, &b)
    }

    fn meaningful_overlap(&self, a: &HashSet<String>, b: &HashSet<String>) -> usize {
        a.intersection(b)
            .filter(|w| !self.stopwords.contains(*w))
            .count()
    }

    /// Related articles from the `lookback` newest digests, at most `max_related`.
    ///
    /// Digests are scanned newest first, then each digest's categories in
    /// stored order, then articles in stored order.
    pub fn related(&self, title: &str, history: &[Digest]) -> Vec<RelatedArticle> {
        let words = title_words(title);
        let mut related = Vec::new();

        for digest in history.iter().take(self.lookback) {
            for previous in digest.categories.values().flatten() {
                if related.len() >= self.max_related {
                    return related;
                }
                let previous_words = title_words(&previous.record.title);
                if self.meaningful_overlap(&words, &previous_words) >= self.min_overlap {
                    related.push(RelatedArticle {
                        title: previous.record.title.clone(),
                        url: previous.record.url.clone(),
                        digest_date: digest.date.clone(),
                    });
                }
            }
        }

        related
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategorizedArticle, OrderedMap, Record};

    fn article(title: &str, url: &str) -> CategorizedArticle {
        CategorizedArticle {
            record: Record {
                title: title.to_string(),
                url: url.to_string(),
                ..Default::default()
            },
            summary: String::new(),
            importance: 3,
            key_entities: vec![],
            related_previous: vec![],
        }
    }

    fn digest(date: &str, buckets: Vec<(&str, Vec<CategorizedArticle>)>) -> Digest {
        let mut categories = OrderedMap::new();
        for (name, articles) in buckets {
            categories.insert(name, articles);
        }
        Digest {
            date: date.to_string(),
            categories,
            ..Default::default()
        }
    }

    #[test]
    fn test_stopwords_do_not_count() {
        let relator = Relator::default();
        // Shared: "the", "als", "of", "trial" -> only "trial" is meaningful.
        assert_eq!(relator.overlap("The ALS trial of hope", "the als trial of doom"), 1);
        assert_eq!(
            relator.overlap("Tofersen gene therapy results", "New tofersen GENE THERAPY data"),
            3
        );
    }

    #[test]
    fn test_related_requires_min_overlap() {
        let history = vec![digest(
            "2024-01-01",
            vec![(
                "research",
                vec![
                    article("Tofersen gene therapy shows promise", "http://a"),
                    article("Tofersen dosing study", "http://b"),
                ],
            )],
        )];

        let related = Relator::default().related("New tofersen gene therapy data", &history);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].url, "http://a");
        assert_eq!(related[0].digest_date, "2024-01-01");
    }

    #[test]
    fn test_related_is_bounded_and_ordered() {
        let matching = |n: usize| article("stem cell therapy trial expands", &format!("http://{n}"));
        let history = vec![
            digest(
                "2024-01-08",
                vec![("treatment", vec![matching(1)]), ("research", vec![matching(2)])],
            ),
            digest("2024-01-01", vec![("research", vec![matching(3), matching(4)])]),
        ];

        let relator = Relator::default();
        let title = "Stem cell therapy trial enrolls patients";
        let related = relator.related(title, &history);
        assert_eq!(related.len(), 3);
        let urls: Vec<&str> = related.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["http://1", "http://2", "http://3"]);
        for r in &related {
            assert!(relator.overlap(title, &r.title) >= 3);
        }
    }

    #[test]
    fn test_lookback_window_limits_scan() {
        let mut history: Vec<Digest> = (0..12)
            .map(|i| digest(&format!("2024-02-{:02}", 28 - i), vec![("research", vec![])]))
            .collect();
        history.push(digest(
            "2024-01-01",
            vec![("research", vec![article("motor neuron imaging breakthrough", "http://old")])],
        ));

        let related = Relator::default().related("Motor neuron imaging breakthrough", &history);
        assert!(related.is_empty());

        let wide = Relator::new(&RelatorConfig {
            lookback: 13,
            ..RelatorConfig::default()
        });
        assert_eq!(wide.related("Motor neuron imaging breakthrough", &history).len(), 1);
    }
}
