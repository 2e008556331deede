//! Loading and writing the JSON history files.
//!
//! A history file is read in full at startup and rewritten in full at the end
//! of a successful run. Writes go to a sibling `.tmp` file that is renamed over
//! the target, so a killed process leaves the previous contents in place.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Failures reading or writing a history file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access history file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file exists but is not the JSON shape this pipeline writes.
    #[error("history file {} is corrupt and was left untouched: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize history for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A JSON document at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp: OsString = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    /// Read and parse the file.
    ///
    /// Returns `Ok(None)` when the file does not exist. A file that exists but
    /// does not parse is reported as [`StoreError::Corrupt`], never as absent.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No history file yet; starting empty");
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        debug!(bytes = bytes.len(), "Loaded history file");
        Ok(Some(value))
    }

    /// Load a history list, treating a missing file as an empty history.
    pub async fn load_history<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.load::<Vec<T>>().await?.unwrap_or_default())
    }

    /// Replace the file with `value`, pretty-printed with two-space indentation.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn write<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = self.temp_path();
        fs::write(&tmp, &json).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        info!(bytes = json.len(), "Wrote history file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("digests.json"));

        let history: Vec<Value> = file.load_history().await.unwrap();
        assert!(history.is_empty());
        assert!(file.load::<Value>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_distinct_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("papers.json");
        std::fs::write(&path, "[{\"selected_date\": ").unwrap();

        let err = JsonFile::new(&path).load_history::<Value>().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert!(err.to_string().contains("corrupt"));
        // The broken file is not replaced by the failed load.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[{\"selected_date\": ");
    }

    #[tokio::test]
    async fn test_wrong_shape_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("digests.json");
        std::fs::write(&path, r#"{"not": "a list"}"#).unwrap();

        let err = JsonFile::new(&path).load_history::<Value>().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_write_replaces_contents_and_cleans_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("papers.json");
        let file = JsonFile::new(&path);

        file.write(&vec![json!({"id": "old"})]).await.unwrap();
        file.write(&vec![json!({"id": "new"}), json!({"id": "old"})]).await.unwrap();

        let loaded: Vec<Value> = file.load_history().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0]["id"], "new");
        assert!(!file.temp_path().exists());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n  {\n    \"id\""));
    }
}
