//! Daily preprint selection: score fetched papers lexically, pick one and
//! prepend it to the capped `papers.json` history.

use super::RunOutcome;
use crate::models::{Paper, SelectedPaper};
use crate::store::{already_stamped, deduplicate, JsonFile, MergePolicy, StoreError};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::cmp::Ordering;
use tracing::{info, instrument};

/// Words that make a paper more interesting when they appear in its title or abstract.
pub const INTERESTING_KEYWORDS: [&str; 20] = [
    "novel",
    "breakthrough",
    "state-of-the-art",
    "sota",
    "survey",
    "benchmark",
    "dataset",
    "transformer",
    "neural",
    "deep learning",
    "vulnerability",
    "attack",
    "defense",
    "privacy",
    "encryption",
    "adversarial",
    "robust",
    "secure",
    "threat",
    "malware",
];

/// Number of top-scoring papers the daily pick is drawn from.
const TOP_POOL: usize = 5;

/// Keyword hits in the lowercased title and summary, plus 0.1 per author up to five.
pub fn score(paper: &Paper) -> f64 {
    let text = format!("{} {}", paper.title, paper.summary).to_lowercase();
    let hits = INTERESTING_KEYWORDS
        .iter()
        .filter(|k| text.contains(*k))
        .count();
    hits as f64 + paper.authors.len().min(5) as f64 * 0.1
}

/// Pick today's paper: uniformly among the top five when there are at least five,
/// otherwise the best one.
pub fn select<R: Rng + ?Sized>(papers: &[Paper], rng: &mut R) -> Option<Paper> {
    let mut scored: Vec<(f64, &Paper)> = papers.iter().map(|p| (score(p), p)).collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    if scored.len() >= TOP_POOL {
        scored[..TOP_POOL].choose(rng).map(|(_, p)| (*p).clone())
    } else {
        scored.first().map(|(_, p)| (*p).clone())
    }
}

/// One configured paper selection run.
#[derive(Debug)]
pub struct PapersPipeline {
    pub store: JsonFile,
    pub policy: MergePolicy,
}

impl PapersPipeline {
    /// Run once for `today` (`YYYY-MM-DD`).
    #[instrument(level = "info", skip_all, fields(path = %self.store.path().display(), %today))]
    pub async fn run<F, R>(
        &self,
        fetch: F,
        today: &str,
        rng: &mut R,
    ) -> Result<RunOutcome, StoreError>
    where
        F: AsyncFnOnce() -> Vec<Paper>,
        R: Rng + ?Sized,
    {
        let mut history: Vec<SelectedPaper> = self.store.load_history().await?;
        if already_stamped(&history, today) {
            info!("Already have a paper for today");
            return Ok(RunOutcome::AlreadyDone);
        }

        let papers = deduplicate(fetch().await);
        info!(count = papers.len(), "Unique papers");

        let Some(paper) = select(&papers, rng) else {
            info!("No papers found");
            return Ok(RunOutcome::NoContent);
        };
        info!(title = %paper.title, id = %paper.id, "Selected paper");

        self.policy.prepend(
            &mut history,
            SelectedPaper {
                paper,
                selected_date: today.to_string(),
            },
        );
        self.store.write(&history).await?;
        Ok(RunOutcome::Written {
            entries: history.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::tempdir;

    fn paper(id: &str, title: &str, summary: &str, authors: usize) -> Paper {
        Paper {
            id: id.to_string(),
            title: title.to_string(),
            summary: summary.to_string(),
            link: format!("http://arxiv.org/abs/{id}"),
            authors: (0..authors).map(|i| format!("Author {i}")).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_score() {
        let p = paper("1", "A Novel Transformer", "We study adversarial attacks.", 7);
        // novel, transformer, adversarial, attack + 5 authors
        assert!((score(&p) - 4.5).abs() < 1e-9);
        assert_eq!(score(&paper("2", "Plain", "text", 0)), 0.0);
    }

    #[test]
    fn test_select_small_pool_takes_best() {
        let papers = vec![
            paper("1", "Plain", "", 1),
            paper("2", "Malware survey", "", 1),
            paper("3", "Other", "", 2),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(select(&papers, &mut rng).unwrap().id, "2");
        assert!(select(&[], &mut rng).is_none());
    }

    #[test]
    fn test_select_draws_from_top_five() {
        let mut papers: Vec<Paper> = (0..5)
            .map(|i| paper(&format!("top{i}"), "novel secure dataset", "", 1))
            .collect();
        papers.extend((0..10).map(|i| paper(&format!("low{i}"), "plain", "", 0)));

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let chosen = select(&papers, &mut rng).unwrap();
            assert!(chosen.id.starts_with("top"));
        }
    }

    #[tokio::test]
    async fn test_stamped_today_skips_fetch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("papers.json");
        let raw = serde_json::to_string_pretty(&json!([{"selected_date": "2024-01-01", "id": "x"}]))
            .unwrap();
        std::fs::write(&path, &raw).unwrap();

        let pipeline = PapersPipeline {
            store: JsonFile::new(&path),
            policy: MergePolicy::capped(30),
        };
        let fetched = Cell::new(false);
        let outcome = pipeline
            .run(
                async || {
                    fetched.set(true);
                    vec![paper("y", "novel", "", 1)]
                },
                "2024-01-01",
                &mut StdRng::seed_from_u64(1),
            )
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::AlreadyDone);
        assert!(!fetched.get());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), raw);
    }

    #[tokio::test]
    async fn test_history_is_capped_newest_first() {
        let dir = tempdir().unwrap();
        let store = JsonFile::new(dir.path().join("papers.json"));
        let existing: Vec<SelectedPaper> = (0..30)
            .map(|i| SelectedPaper {
                paper: paper(&format!("old{i}"), "t", "", 1),
                selected_date: format!("2023-12-{:02}", 30 - i),
            })
            .collect();
        store.write(&existing).await.unwrap();

        let pipeline = PapersPipeline {
            store: store.clone(),
            policy: MergePolicy::capped(30),
        };
        let outcome = pipeline
            .run(
                async || vec![paper("new", "survey", "", 2)],
                "2024-01-01",
                &mut StdRng::seed_from_u64(3),
            )
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Written { entries: 30 });

        let history: Vec<SelectedPaper> = store.load_history().await.unwrap();
        assert_eq!(history.len(), 30);
        assert_eq!(history[0].paper.id, "new");
        assert_eq!(history[0].selected_date, "2024-01-01");
        assert_eq!(history[1].paper.id, "old0");
        assert_eq!(history[29].paper.id, "old28");
    }

    #[tokio::test]
    async fn test_no_papers_leaves_history_alone() {
        let dir = tempdir().unwrap();
        let store = JsonFile::new(dir.path().join("papers.json"));
        let pipeline = PapersPipeline {
            store: store.clone(),
            policy: MergePolicy::capped(30),
        };
        let outcome = pipeline
            .run(async || Vec::new(), "2024-01-01", &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::NoContent);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_duplicate_papers_collapse() {
        let a = paper("1", "Same", "", 1);
        let unique = deduplicate(vec![a.clone(), a.clone(), paper("2", "Other", "", 1)]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0], a);
    }
}
