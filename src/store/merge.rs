//! Merging a run's output into its history.
//!
//! Histories are newest first. A run prepends exactly one entry, then the
//! optional cap drops the oldest entries. Before any work is done the newest
//! entry's date stamp is compared with today, which limits every history to
//! one new entry per calendar day.

use tracing::debug;

/// An entry carrying the date (`YYYY-MM-DD`) it was produced for.
pub trait DateStamped {
    fn date_stamp(&self) -> Option<&str>;
}

/// True when the newest entry was already produced for `today`.
pub fn already_stamped<T: DateStamped>(history: &[T], today: &str) -> bool {
    history.first().and_then(DateStamped::date_stamp) == Some(today)
}

/// How a history grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergePolicy {
    cap: Option<usize>,
}

impl MergePolicy {
    pub fn uncapped() -> Self {
        Self { cap: None }
    }

    pub fn capped(cap: usize) -> Self {
        Self { cap: Some(cap) }
    }

    /// Build from a configured cap where 0 means unbounded.
    pub fn from_cap(cap: usize) -> Self {
        if cap == 0 {
            Self::uncapped()
        } else {
            Self::capped(cap)
        }
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }

    /// Put `entry` at the front and truncate to the cap.
    pub fn prepend<T>(&self, history: &mut Vec<T>, entry: T) {
        history.insert(0, entry);
        if let Some(cap) = self.cap {
            history.truncate(cap);
        }
        debug!(len = history.len(), cap = ?self.cap, "Merged entry into history");
    }

    /// Trim a list that grows at the back, keeping its newest `cap` entries.
    pub fn trim_appended<T>(&self, list: &mut Vec<T>) {
        if let Some(cap) = self.cap {
            if list.len() > cap {
                let excess = list.len() - cap;
                list.drain(..excess);
            }
        }
    }
}
