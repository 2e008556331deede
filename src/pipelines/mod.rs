//! The three batch pipelines.
//!
//! Each one is fetch, then dedupe or filter, then an optional LLM call, then
//! a merge into the prior state and a single write. Fetching is injected as
//! an async closure so the pipelines run against canned records in tests.

pub mod digest;
pub mod openings;
pub mod papers;

/// What a pipeline run did to its history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The newest entry is already stamped today; nothing was fetched or written.
    AlreadyDone,
    /// Sources produced nothing; the file was not touched.
    NoContent,
    /// The file was rewritten and now holds `entries` items.
    Written { entries: usize },
}
