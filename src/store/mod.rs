//! The incremental digest store: flat-file histories that grow by one entry per run.
//!
//! Every pipeline drives the same cycle:
//!
//! 1. **Load**: read the full prior history ([`history`])
//! 2. **Fingerprint**: drop repeats inside the fresh batch ([`fingerprint`])
//! 3. **Relate**: link new items to recent history by title vocabulary ([`relate`])
//! 4. **Merge**: prepend the new entry and enforce the cap ([`merge`])
//! 5. **Write**: replace the history file in one rename ([`history`])
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── digests.json    # newest digest first, uncapped by default
//! ├── papers.json     # newest selection first, capped at 30
//! └── openings.json   # {openings, endings, last_updated}
//! ```

pub mod fingerprint;
pub mod history;
pub mod merge;
pub mod relate;

pub use fingerprint::{deduplicate, Fingerprint};
pub use history::{JsonFile, StoreError};
pub use merge::{already_stamped, DateStamped, MergePolicy};
pub use relate::Relator;
