//! Story page generator: asks the LLM for opening and ending pages inspired by
//! award-winning science fiction and keeps a bounded cache in `openings.json`.

use super::RunOutcome;
use crate::config::OpeningsConfig;
use crate::llm::AskAsync;
use crate::models::{GeneratedPage, OpeningsCache, PageKind};
use crate::store::{JsonFile, MergePolicy, StoreError};
use crate::utils::utc_timestamp;
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{error, info, instrument, warn};

/// A Hugo or Nebula winning novel or novella.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Work {
    pub title: &'static str,
    pub author: &'static str,
    pub year: u16,
}

const fn work(title: &'static str, author: &'static str, year: u16) -> Work {
    Work {
        title,
        author,
        year,
    }
}

pub const AWARD_WINNING_WORKS: &[Work] = &[
    // Hugo and Nebula double winners
    work("Dune", "Frank Herbert", 1966),
    work("The Left Hand of Darkness", "Ursula K. Le Guin", 1970),
    work("Ringworld", "Larry Niven", 1971),
    work("The Gods Themselves", "Isaac Asimov", 1973),
    work("Rendezvous with Rama", "Arthur C. Clarke", 1974),
    work("The Dispossessed", "Ursula K. Le Guin", 1975),
    work("The Forever War", "Joe Haldeman", 1976),
    work("Gateway", "Frederik Pohl", 1978),
    work("Dreamsnake", "Vonda N. McIntyre", 1979),
    work("The Fountains of Paradise", "Arthur C. Clarke", 1980),
    work("Startide Rising", "David Brin", 1984),
    work("Neuromancer", "William Gibson", 1985),
    work("Ender's Game", "Orson Scott Card", 1986),
    work("Speaker for the Dead", "Orson Scott Card", 1987),
    work("Falling Free", "Lois McMaster Bujold", 1989),
    work("Hyperion", "Dan Simmons", 1990),
    work("Doomsday Book", "Connie Willis", 1993),
    work("Forever Peace", "Joe Haldeman", 1998),
    work("American Gods", "Neil Gaiman", 2002),
    work("Paladin of Souls", "Lois McMaster Bujold", 2004),
    work("The Yiddish Policemen's Union", "Michael Chabon", 2008),
    work("The Windup Girl", "Paolo Bacigalupi", 2010),
    work("Blackout/All Clear", "Connie Willis", 2011),
    work("Among Others", "Jo Walton", 2012),
    work("Ancillary Justice", "Ann Leckie", 2014),
    work("The Fifth Season", "N.K. Jemisin", 2016),
    work("The Obelisk Gate", "N.K. Jemisin", 2017),
    work("The Stone Sky", "N.K. Jemisin", 2018),
    work("A Memory Called Empire", "Arkady Martine", 2020),
    work("Network Effect", "Martha Wells", 2021),
    work("A Desolation Called Peace", "Arkady Martine", 2022),
    // Hugo
    work("The Moon is a Harsh Mistress", "Robert A. Heinlein", 1967),
    work("Stand on Zanzibar", "John Brunner", 1969),
    work("A Fire Upon the Deep", "Vernor Vinge", 1993),
    work("Harry Potter and the Goblet of Fire", "J.K. Rowling", 2001),
    work("Jonathan Strange & Mr Norrell", "Susanna Clarke", 2005),
    work("Rainbows End", "Vernor Vinge", 2007),
    work("Redshirts", "John Scalzi", 2013),
    work("The Three-Body Problem", "Liu Cixin", 2015),
    // Nebula
    work("Babel-17", "Samuel R. Delany", 1967),
    work("The Einstein Intersection", "Samuel R. Delany", 1968),
    work("Rite of Passage", "Alexei Panshin", 1969),
    work("A Time of Changes", "Robert Silverberg", 1972),
    work("The Man Who Folded Himself", "David Gerrold", 1974),
    work("Man Plus", "Frederik Pohl", 1977),
    work("Timescape", "Gregory Benford", 1981),
    work("No Enemy But Time", "Michael Bishop", 1983),
    work("Tehanu", "Ursula K. Le Guin", 1991),
    work("Red Mars", "Kim Stanley Robinson", 1993),
    work("Moving Mars", "Greg Bear", 1994),
    work("The Terminal Experiment", "Robert J. Sawyer", 1996),
    work("The Moon and the Sun", "Vonda N. McIntyre", 1998),
    work("Parable of the Talents", "Octavia E. Butler", 1999),
    work("Darwin's Radio", "Greg Bear", 2000),
    work("The Quantum Rose", "Catherine Asaro", 2002),
    work("The Speed of Dark", "Elizabeth Moon", 2004),
    work("Seeker", "Jack McDevitt", 2007),
    work("The Drowning Girl", "Caitlin R. Kiernan", 2013),
    work("Annihilation", "Jeff VanderMeer", 2015),
    work("All the Birds in the Sky", "Charlie Jane Anders", 2017),
    work("The Calculating Stars", "Mary Robinette Kowal", 2019),
    work("A Master of Djinn", "P. Djeli Clark", 2022),
    work("The Spare Man", "Mary Robinette Kowal", 2023),
    // Novellas
    work("The Word for World is Forest", "Ursula K. Le Guin", 1973),
    work("A Boy and His Dog", "Harlan Ellison", 1970),
    work("Beggars in Spain", "Nancy Kress", 1992),
    work("The Empress of Salt and Fortune", "Nghi Vo", 2021),
    work("Binti", "Nnedi Okorafor", 2016),
    work("All Systems Red", "Martha Wells", 2018),
    work("Artificial Condition", "Martha Wells", 2019),
    work(
        "This Is How You Lose the Time War",
        "Amal El-Mohtar & Max Gladstone",
        2020,
    ),
    work("Ring Shout", "P. Djeli Clark", 2021),
    work("Elder Race", "Adrian Tchaikovsky", 2023),
];

pub const STYLES: &[&str] = &[
    "hard science fiction with detailed technical accuracy",
    "space opera with sweeping galactic scope",
    "cyberpunk with gritty urban dystopia",
    "literary science fiction with deep character study",
    "military science fiction with tactical precision",
    "biopunk exploring genetic modification",
    "post-apocalyptic with survival themes",
    "first contact with alien civilizations",
    "time travel with paradox exploration",
    "generation ship with society evolution",
    "virtual reality and consciousness transfer",
    "climate fiction with environmental themes",
    "afrofuturism with cultural richness",
    "solarpunk with optimistic futures",
];

pub const THEMES: &[&str] = &[
    "the nature of consciousness and identity",
    "humanity's relationship with artificial intelligence",
    "the consequences of unchecked technological progress",
    "colonialism and its echoes across the stars",
    "memory, loss, and what makes us human",
    "revolution against oppressive systems",
    "first contact and the challenge of communication",
    "the price of immortality",
    "ecological collapse and renewal",
    "the boundaries between human and machine",
    "time as a prison and a gift",
    "found family in the vastness of space",
    "the weight of empire and resistance",
    "isolation and connection across light-years",
];

/// Prompt for one page of the given kind.
pub fn build_prompt(work: &Work, kind: PageKind, style: &str, theme: &str) -> String {
    let (hook, character) = match kind {
        PageKind::Opening => (
            "Hook the reader immediately with intrigue, action, or mystery",
            "Introduce an intriguing character or situation",
        ),
        PageKind::Ending => (
            "Provide a satisfying, thought-provoking conclusion that resonates",
            "Leave the reader with a lasting emotional impact",
        ),
    };

    format!(
        r#"You are a masterful science fiction author inspired by the works of {author},
particularly their award-winning novel "{title}".

Write a compelling {kind} page for an original science fiction story in the style of {style},
exploring the theme of {theme}.

Requirements:
- Write exactly one page (about 250-300 words)
- Create an original story, not a retelling of "{title}"
- {hook}
- Use vivid, sensory prose
- {character}

Write only the {kind} page, no titles or explanations:"#,
        author = work.author,
        title = work.title,
    )
}

/// Pages of `kind` to request: `per_run`, or fewer when the cache is nearly full.
pub fn pages_needed(cache: &OpeningsCache, kind: PageKind, config: &OpeningsConfig) -> usize {
    config
        .per_run
        .min(config.max_cache.saturating_sub(cache.pages(kind).len()))
}

/// One configured generator run.
#[derive(Debug)]
pub struct OpeningsPipeline<'a, A> {
    pub store: JsonFile,
    pub llm: &'a A,
    pub config: &'a OpeningsConfig,
}

impl<A> OpeningsPipeline<'_, A>
where
    A: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(%kind))]
    async fn generate<R: Rng + ?Sized>(
        &self,
        cache: &mut OpeningsCache,
        kind: PageKind,
        rng: &mut R,
    ) {
        let needed = pages_needed(cache, kind, self.config);
        info!(current = cache.pages(kind).len(), needed, "Generating pages");

        for i in 0..needed {
            let (Some(work), Some(style), Some(theme)) = (
                AWARD_WINNING_WORKS.choose(rng),
                STYLES.choose(rng),
                THEMES.choose(rng),
            ) else {
                return;
            };
            let prompt = build_prompt(work, kind, style, theme);

            match self.llm.ask(&prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    cache.pages_mut(kind).push(GeneratedPage {
                        text: text.trim().to_string(),
                        inspired_by: work.title.to_string(),
                        author: work.author.to_string(),
                        kind,
                        generated_at: utc_timestamp(),
                    });
                    info!(
                        n = i + 1,
                        of = needed,
                        inspired_by = work.title,
                        year = work.year,
                        "Generated page"
                    );
                }
                Ok(_) => warn!(n = i + 1, "Model returned an empty page; skipped"),
                Err(e) => error!(n = i + 1, error = %e, "Page generation failed; skipped"),
            }
        }
    }

    /// Top up both lists, trim them to the cache size and write the cache.
    #[instrument(level = "info", skip_all, fields(path = %self.store.path().display()))]
    pub async fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<RunOutcome, StoreError> {
        let mut cache: OpeningsCache = self.store.load().await?.unwrap_or_default();
        info!(
            openings = cache.openings.len(),
            endings = cache.endings.len(),
            "Cache status"
        );

        self.generate(&mut cache, PageKind::Opening, rng).await;
        self.generate(&mut cache, PageKind::Ending, rng).await;

        let policy = MergePolicy::capped(self.config.max_cache);
        policy.trim_appended(&mut cache.openings);
        policy.trim_appended(&mut cache.endings);
        cache.last_updated = Some(utc_timestamp());

        self.store.write(&cache).await?;
        info!(
            openings = cache.openings.len(),
            endings = cache.endings.len(),
            "Cache saved"
        );
        Ok(RunOutcome::Written {
            entries: cache.openings.len() + cache.endings.len(),
        })
    }
}
