//! Within-batch identity and deduplication.
//!
//! The identity key is the first 12 hex characters of SHA-256 over `url`
//! followed by `title`, byte for byte. There is no case or whitespace
//! normalization, so records differing only in spacing stay distinct.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

/// Width of an identity key in hex characters.
pub const IDENTITY_KEY_LEN: usize = 12;

/// Anything that can be identified by its url and title.
pub trait Fingerprint {
    fn url(&self) -> &str;

    fn title(&self) -> &str;

    /// Record the key on the surviving item. Items that do not persist their key ignore it.
    fn set_identity_key(&mut self, _key: String) {}

    fn identity_key(&self) -> String {
        identity_key(self.url(), self.title())
    }
}

/// Compute the identity key for a url/title pair. Empty inputs are valid.
pub fn identity_key(url: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(title.as_bytes());
    let mut key = hex::encode(hasher.finalize());
    key.truncate(IDENTITY_KEY_LEN);
    key
}

/// Keep the first item for every distinct identity key, in first-seen order.
///
/// Each survivor is annotated with its key.
pub fn deduplicate<T: Fingerprint>(items: Vec<T>) -> Vec<T> {
    let before = items.len();
    let mut seen = HashSet::new();

    let unique: Vec<T> = items
        .into_iter()
        .filter_map(|mut item| {
            let key = item.identity_key();
            if seen.insert(key.clone()) {
                item.set_identity_key(key);
                Some(item)
            } else {
                None
            }
        })
        .collect();

    debug!(before, after = unique.len(), "Deduplicated batch");
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;

    fn record(title: &str, url: &str, description: &str) -> Record {
        Record {
            title: title.to_string(),
            url: url.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_identity_key_shape() {
        let key = identity_key("http://a", "ALS trial begins");
        assert_eq!(key.len(), IDENTITY_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, identity_key("http://a", "ALS trial begins"));
    }

    #[test]
    fn test_identity_key_is_concatenation() {
        // url+title is hashed as one string, so the split point does not matter.
        assert_eq!(identity_key("http://ab", "c"), identity_key("http://a", "bc"));
    }

    #[test]
    fn test_empty_fields_still_get_a_key() {
        let key = identity_key("", "");
        assert_eq!(key, "e3b0c44298fc");
    }

    #[test]
    fn test_exact_duplicates_keep_first() {
        let batch = vec![
            record("ALS trial begins", "http://a", "first"),
            record("Other story", "http://b", ""),
            record("ALS trial begins", "http://a", "second"),
        ];

        let unique = deduplicate(batch);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].description, "first");
        assert_eq!(unique[1].title, "Other story");
        assert_eq!(
            unique[0].article_id.as_deref(),
            Some(identity_key("http://a", "ALS trial begins").as_str())
        );
    }

    #[test]
    fn test_whitespace_variants_are_distinct() {
        let batch = vec![
            record("ALS trial begins", "http://a", ""),
            record("ALS  trial begins", "http://a", ""),
            record("als trial begins", "http://a", ""),
        ];

        assert_eq!(deduplicate(batch).len(), 3);
    }
}
